use super::*;
use crate::completion::Role;
use crate::http::ServiceError;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;

struct CannedCompletion {
    reply: std::result::Result<String, ServiceError>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl CannedCompletion {
    fn replying(reply: std::result::Result<String, ServiceError>) -> Self {
        Self {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionClient for CannedCompletion {
    async fn complete(
        &self,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, ServiceError> {
        self.seen.lock().expect("lock").push(messages.to_vec());
        self.reply.clone()
    }
}

fn practice() -> Metadata {
    json!({"type": "practice", "practice_text": "pause and breathe", "id": "P-anger"})
        .as_object()
        .cloned()
        .expect("literal is an object")
}

#[test]
fn system_block_carries_template() {
    let messages = build_messages("q", &[], &ConversationContext::default());

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::System);
    for section in [
        "Verse:",
        "Paraphrase:",
        "Summary:",
        "Actionable insight:",
        "References:",
    ] {
        assert!(messages[0].content.contains(section), "missing {section}");
    }
}

#[test]
fn user_block_has_concern_query_and_context() {
    let context = ConversationContext::new(Some(" Anger ".to_string()), Some("work".to_string()));
    let messages = build_messages("How do I handle anger?", &[practice()], &context);

    let user = &messages[1];
    assert_eq!(user.role, Role::User);
    assert!(user.content.contains("Concern: Anger\n"));
    assert!(user.content.contains("Subtopic: work\n"));
    assert!(user.content.contains("How do I handle anger?"));
    assert!(user.content.contains("[1] {"));
    assert!(user.content.contains("\"practice_text\":\"pause and breathe\""));
}

#[test]
fn missing_context_is_stated() {
    let context = ConversationContext::new(Some("   ".to_string()), None);
    assert_eq!(context, ConversationContext::default());

    let messages = build_messages("hello", &[], &context);
    assert!(messages[1].content.contains("Concern: not specified"));
    assert!(messages[1].content.contains("(no matching records)"));
}

#[tokio::test]
async fn compose_makes_one_call() {
    let client = Arc::new(CannedCompletion::replying(Ok("Verse: ...".to_string())));
    let composer = AnswerComposer::new(Arc::clone(&client) as Arc<dyn CompletionClient>);

    let answer = composer
        .compose(
            "How do I handle anger?",
            &[practice()],
            &ConversationContext::default(),
        )
        .await
        .expect("compose should succeed");

    assert_eq!(answer, "Verse: ...");
    let seen = client.seen.lock().expect("lock").clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0],
        build_messages(
            "How do I handle anger?",
            &[practice()],
            &ConversationContext::default()
        )
    );
}

#[tokio::test]
async fn completion_failure_propagates() {
    let client = Arc::new(CannedCompletion::replying(Err(ServiceError::Transient(
        "HTTP 502".to_string(),
    ))));
    let composer = AnswerComposer::new(Arc::clone(&client) as Arc<dyn CompletionClient>);

    let error = composer
        .compose("q", &[], &ConversationContext::default())
        .await
        .expect_err("failure should surface");

    assert!(matches!(error, RagError::Completion(_)));
    assert_eq!(client.seen.lock().expect("lock").len(), 1);
}
