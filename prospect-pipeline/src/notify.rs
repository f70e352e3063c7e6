//! New-company alerts.
use crate::record::CompanyRecord;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use prospect_common::{ProspectError, Result};
use serde_json::Value;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, record: &CompanyRecord) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub sender: String,
    pub password: String,
    pub receiver: String,
}

pub fn subject_for(record: &CompanyRecord) -> String {
    format!("New company found: {}", record.name().unwrap_or("Unknown"))
}

/// One `key: value` line per non-empty field. Object values (people found by
/// enrichment) render their `name`.
pub fn body_for(record: &CompanyRecord) -> String {
    let mut body = String::from("A new company matching your filters was found:\n\n");
    for (key, value) in record.fields() {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s.trim().to_string(),
            Value::Object(o) => match o.get("name").and_then(Value::as_str) {
                Some(name) => name.trim().to_string(),
                None => value.to_string(),
            },
            other => other.to_string(),
        };
        if text.is_empty() {
            continue;
        }
        body.push_str(key);
        body.push_str(": ");
        body.push_str(&text);
        body.push('\n');
    }
    body
}

/// Mails over implicit TLS (port 465 by default).
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let from: Mailbox = settings
            .sender
            .parse()
            .map_err(|e| ProspectError::Notify(format!("invalid sender '{}': {e}", settings.sender)))?;
        let to: Mailbox = settings
            .receiver
            .parse()
            .map_err(|e| ProspectError::Notify(format!("invalid receiver '{}': {e}", settings.receiver)))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .map_err(|e| ProspectError::Notify(format!("smtp relay '{}': {e}", settings.host)))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.sender.clone(),
                settings.password.clone(),
            ))
            .build();
        Ok(Self { transport, from, to })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, record: &CompanyRecord) -> Result<()> {
        let subject = subject_for(record);
        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(body_for(record))
            .map_err(|e| ProspectError::Notify(format!("build message: {e}")))?;
        self.transport
            .send(msg)
            .await
            .map_err(|e| ProspectError::Notify(format!("smtp send: {e}")))?;
        tracing::info!(target: "pipeline.notify", %subject, "notify.sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subject_uses_name_or_unknown() {
        let r = CompanyRecord::named("Acme");
        assert_eq!(subject_for(&r), "New company found: Acme");
        assert_eq!(subject_for(&CompanyRecord::new()), "New company found: Unknown");
    }

    #[test]
    fn body_lists_non_empty_fields() {
        let r: CompanyRecord = serde_json::from_value(json!({
            "Company Name": "Acme",
            "Funding": "$1M",
            "Employee size": "",
            "CEO": {"name": "Jane Doe", "source": "acme.io"},
            "Employees": 42
        }))
        .unwrap();
        let body = body_for(&r);
        assert!(body.contains("Company Name: Acme\n"));
        assert!(body.contains("Funding: $1M\n"));
        assert!(body.contains("CEO: Jane Doe\n"));
        assert!(body.contains("Employees: 42\n"));
        assert!(!body.contains("Employee size"));
    }

    #[test]
    fn bad_addresses_are_rejected() {
        let settings = SmtpSettings {
            host: "smtp.example.com".into(),
            port: 465,
            sender: "not an address".into(),
            password: "pw".into(),
            receiver: "ops@example.com".into(),
        };
        assert!(matches!(SmtpNotifier::new(&settings), Err(ProspectError::Notify(_))));
    }
}
