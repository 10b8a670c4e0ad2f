use super::*;
use serde::Deserialize;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize)]
struct Echo {
    ok: bool,
}

#[test]
fn status_classification() {
    assert!(ServiceError::from_status(429).is_rate_limited());
    assert!(ServiceError::from_status(429).is_transient());
    assert!(ServiceError::from_status(500).is_transient());
    assert!(ServiceError::from_status(503).is_transient());
    assert!(!ServiceError::from_status(400).is_transient());
    assert!(!ServiceError::from_status(401).is_transient());
    assert!(!ServiceError::from_status(404).is_transient());
}

#[test]
fn endpoint_keeps_base_path() {
    let url = endpoint("https://api.openai.com/v1/", "/embeddings").expect("valid url");
    assert_eq!(url.as_str(), "https://api.openai.com/v1/embeddings");

    let url = endpoint("http://localhost:11434", "api/embed").expect("valid url");
    assert_eq!(url.as_str(), "http://localhost:11434/api/embed");
}

#[tokio::test]
async fn post_json_decodes_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("x-test", "yes"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok": true}"#))
        .mount(&server)
        .await;

    let agent = build_agent(Duration::from_secs(5));
    let url = endpoint(&server.uri(), "echo").expect("valid url");
    let echo: Echo = post_json(&agent, &url, &[("x-test", "yes")], &serde_json::json!({}))
        .expect("request should succeed");

    assert!(echo.ok);
}

#[tokio::test]
async fn post_json_classifies_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let agent = build_agent(Duration::from_secs(5));
    let body = serde_json::json!({});
    let call = |p: &str| {
        let url = endpoint(&server.uri(), p).expect("valid url");
        post_json::<_, Echo>(&agent, &url, &[], &body).expect_err("request should fail")
    };

    assert!(call("busy").is_rate_limited());
    assert!(matches!(call("broken"), ServiceError::Transient(_)));
    assert!(matches!(call("bad"), ServiceError::Permanent(_)));
    assert!(matches!(call("garbage"), ServiceError::Permanent(_)));
}

#[test]
fn connection_refused_is_transient() {
    let agent = build_agent(Duration::from_secs(2));
    let url = endpoint("http://127.0.0.1:1", "nothing").expect("valid url");
    let error = post_json::<_, Echo>(&agent, &url, &[], &serde_json::json!({}))
        .expect_err("nothing listens on port 1");
    assert!(error.is_transient(), "unexpected error: {:?}", error);
}
