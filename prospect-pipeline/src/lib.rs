//! Company discovery: turn free-text filters into structured company
//! records.
//!
//! The flow is interpret → retrieve → extract → merge → (enrich) → persist,
//! with a watch cycle ([`Pipeline::poll_once`]) that notifies about companies
//! not seen before. Model output is never trusted to be valid JSON; every
//! parse goes through a [`RecoveryChain`].
//!
//! # Examples
//! ```
//! use prospect_pipeline::{RecoveryChain, recover::records_from_value};
//!
//! let chain = RecoveryChain::default();
//! let text = "Sure! ```json\n[{\"Company Name\": \"Acme\", \"Funding\": \"$1M\"},]\n```";
//! let value = chain.recover(text).unwrap();
//! let records = records_from_value(value);
//! assert_eq!(records[0].name(), Some("Acme"));
//! ```
pub mod answer;
pub mod enrich;
pub mod extract;
pub mod interpret;
pub mod merge;
pub mod notify;
pub mod pipeline;
pub mod record;
pub mod recover;
pub mod store;

pub use answer::{AnswerSource, ChatAnswer, StreamAnswer};
pub use enrich::Enricher;
pub use extract::Extractor;
pub use interpret::{FilterInterpreter, Interpretation};
pub use merge::Merger;
pub use notify::{Notifier, SmtpNotifier, SmtpSettings};
pub use pipeline::{Pipeline, PollSummary, StoragePaths};
pub use record::{CompanyRecord, FilterKeys, FilterRecord};
pub use recover::RecoveryChain;
