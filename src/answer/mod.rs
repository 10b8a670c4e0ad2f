// Answer composition
// Persona + rigid reply template in the system block; concern, query and
// retrieved records in the user block; one completion call per request

#[cfg(test)]
mod tests;

use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

use crate::completion::{ChatMessage, CompletionClient};
use crate::records::Metadata;
use crate::{RagError, Result};

pub const SYSTEM_PROMPT: &str = "\
You are a calm, compassionate guide who draws on the Bhagavad Gita to help people \
with everyday struggles. Speak warmly and plainly, never preach, and never invent \
verses, chapters or sources: use only the context records you are given. If the \
context does not address the question, say so gently.

Always reply using exactly this structure:

Verse: <the most relevant verse, Sanskrit first if available, with chapter and verse number>
Paraphrase: <a simple, colloquial paraphrase of that verse>
Summary: <two or three sentences connecting the teaching to the person's concern>
Actionable insight: <one small, concrete practice they can try today>
References: <chapter.verse ids and practice titles you drew on>";

/// What the person said they need help with, if anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationContext {
    pub concern: Option<String>,
    pub subtopic: Option<String>,
}

impl ConversationContext {
    #[inline]
    pub fn new(concern: Option<String>, subtopic: Option<String>) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            concern: clean(concern),
            subtopic: clean(subtopic),
        }
    }
}

/// Build the system and user messages for one request
#[inline]
pub fn build_messages(
    query: &str,
    retrieved: &[Metadata],
    context: &ConversationContext,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_block(query, retrieved, context)),
    ]
}

fn user_block(query: &str, retrieved: &[Metadata], context: &ConversationContext) -> String {
    let mut block = String::new();

    let _ = writeln!(
        block,
        "Concern: {}",
        context.concern.as_deref().unwrap_or("not specified")
    );
    let _ = writeln!(
        block,
        "Subtopic: {}",
        context.subtopic.as_deref().unwrap_or("not specified")
    );
    let _ = writeln!(block, "\nQuestion:\n{}", query.trim());

    block.push_str("\nContext records:\n");
    if retrieved.is_empty() {
        block.push_str("(no matching records)\n");
    }
    for (index, metadata) in retrieved.iter().enumerate() {
        let rendered =
            serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string());
        let _ = writeln!(block, "[{}] {}", index + 1, rendered);
    }

    block
}

pub struct AnswerComposer {
    client: Arc<dyn CompletionClient>,
}

impl std::fmt::Debug for AnswerComposer {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerComposer").finish_non_exhaustive()
    }
}

impl AnswerComposer {
    #[inline]
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Generate a reply grounded on `retrieved`; failures are returned as-is
    #[inline]
    pub async fn compose(
        &self,
        query: &str,
        retrieved: &[Metadata],
        context: &ConversationContext,
    ) -> Result<String> {
        let messages = build_messages(query, retrieved, context);
        debug!(
            "Composing answer from {} context record(s)",
            retrieved.len()
        );

        let answer = self
            .client
            .complete(&messages)
            .await
            .map_err(RagError::Completion)?;

        info!("Composed answer ({} chars)", answer.chars().count());
        Ok(answer)
    }
}
