use prospect_http::RetryPolicy;
use prospect_web::scraperapi::ScraperApiClient;
use prospect_web::stream::StreamSearchClient;
use prospect_web::tavily::TavilyClient;
use prospect_web::SearchProvider;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn tavily_requests_answer_and_prefers_raw_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("authorization", "Bearer tvly-test"))
        .and(body_partial_json(json!({
            "query": "B2B SaaS companies funded 1M",
            "search_depth": "advanced",
            "include_answer": true,
            "include_raw_content": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "Acme and Globex raised seed rounds.",
            "results": [
                {"title": "Seed list", "url": "https://a.example", "content": "short", "raw_content": "Acme raised $1M"},
                {"title": "Other", "url": "https://b.example", "content": "Globex, 40 staff", "raw_content": null}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TavilyClient::with_base_url("tvly-test".into(), &server.uri()).unwrap();
    let report = client.search("B2B SaaS companies funded 1M").await.unwrap();

    assert_eq!(report.answer.as_deref(), Some("Acme and Globex raised seed rounds."));
    assert_eq!(report.hits.len(), 2);
    assert_eq!(report.hits[0].content, "Acme raised $1M");
    assert_eq!(report.hits[1].content, "Globex, 40 staff");
}

#[tokio::test]
async fn tavily_errors_are_search_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": {"error": "Unauthorized"}})))
        .mount(&server)
        .await;

    let client = TavilyClient::with_base_url("bad".into(), &server.uri())
        .unwrap()
        .with_policy(RetryPolicy::none());
    let err = client.search("anything").await.unwrap_err();
    assert!(matches!(err, prospect_common::ProspectError::Search(_)));
}

#[tokio::test]
async fn scraperapi_maps_organic_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/structured/google/search"))
        .and(query_param("api_key", "scr-test"))
        .and(query_param("query", "CEO and CTO of Acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "search_information": {"total_results": 2},
            "organic_results": [
                {"position": 1, "title": "Acme leadership", "link": "https://acme.example/team", "snippet": "Jane Doe, CEO of Acme"},
                {"position": 2, "title": "Acme CTO", "link": "https://news.example/acme", "snippet": "John Roe is CTO"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ScraperApiClient::with_base_url("scr-test".into(), &server.uri()).unwrap();
    let report = client.search("CEO and CTO of Acme").await.unwrap();
    assert!(report.answer.is_none());
    assert_eq!(report.hits[0].url, "https://acme.example/team");
    assert_eq!(report.hits[1].content, "John Roe is CTO");
}

#[tokio::test]
async fn stream_accumulates_llm_chunks_only() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"type\":\"sources\",\"data\":[]}\n\n",
        "data: {\"type\":\"llm\",\"text\":\"{\\\"companies\\\": [\"}\n\n",
        "data: {\"type\":\"llm\",\"text\":\"{\\\"Company Name\\\": \\\"Acme\\\"}]}\"}\n\n",
        "data: [DONE]\n\n",
        "data: {\"type\":\"llm\",\"text\":\"after done\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/custom_search_stream"))
        .and(header("x-api-key", "op-test"))
        .and(body_partial_json(json!({
            "user_prompt": "list of companies that: seed fintech",
            "model": "o3-mini-high",
            "return_sources": true
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = StreamSearchClient::new(
        "op-test".into(),
        &format!("{}/custom_search_stream", server.uri()),
    )
    .unwrap();
    let text = client
        .stream_text("system", "list of companies that: seed fintech")
        .await
        .unwrap();
    assert_eq!(text, r#"{"companies": [{"Company Name": "Acme"}]}"#);
}

/// Serve one POST with a chunked event-stream body, flushing each chunk
/// separately.
async fn serve_chunks(chunks: Vec<Vec<u8>>) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut req = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = sock.read(&mut buf).await.unwrap();
            req.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&req).to_lowercase();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let len = text
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if req.len() >= head_end + 4 + len {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        sock.write_all(
            b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
        )
        .await
        .unwrap();
        // The client may hang up early, so write errors are ignored.
        for chunk in chunks {
            let _ = sock.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await;
            let _ = sock.write_all(&chunk).await;
            let _ = sock.write_all(b"\r\n").await;
            let _ = sock.flush().await;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let _ = sock.write_all(b"0\r\n\r\n").await;
        let _ = sock.flush().await;
    });
    format!("http://{addr}/custom_search_stream")
}

#[tokio::test]
async fn stream_keeps_characters_split_across_chunks() {
    let body = "data: {\"type\":\"llm\",\"text\":\"Zürich Robotics\"}\n\ndata: [DONE]\n\n".as_bytes();
    let split = body.iter().position(|b| *b == 0xC3).unwrap() + 1;
    let endpoint = serve_chunks(vec![body[..split].to_vec(), body[split..].to_vec()]).await;

    let client = StreamSearchClient::new("op-test".into(), &endpoint)
        .unwrap()
        .with_policy(RetryPolicy::none());
    let text = client.stream_text("system", "robotics in Zürich").await.unwrap();
    assert_eq!(text, "Zürich Robotics");
}

#[tokio::test]
async fn stream_stops_at_done_without_reading_the_tail() {
    let endpoint = serve_chunks(vec![
        b"data: {\"type\":\"llm\",\"text\":\"Acme\"}\n".to_vec(),
        b"data: [DONE]\n".to_vec(),
        // No trailing newline: would only be parsed as a leftover tail.
        b"data: {\"type\":\"llm\",\"text\":\" and more\"}".to_vec(),
    ])
    .await;

    let client = StreamSearchClient::new("op-test".into(), &endpoint)
        .unwrap()
        .with_policy(RetryPolicy::none());
    assert_eq!(client.stream_text("system", "acme").await.unwrap(), "Acme");
}
