//! Conversation context — the ordered dialogue history used to prompt
//! language generation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry in the dialogue history, shaped for chat-completions APIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

/// Append-only dialogue history for one session.
///
/// Seeded once at session start with the persona system prompt plus one
/// trailing system instruction requesting the introductory greeting. Appends
/// follow pipeline frame order, never wall-clock arrival of network messages.
#[derive(Debug, Default)]
pub struct ConversationContext {
    messages: Vec<ContextMessage>,
}

impl ConversationContext {
    /// Seed a fresh context with the persona prompt and greeting instruction.
    ///
    /// When the caller authenticated with a display name, it is folded into
    /// the greeting instruction so the agent can greet them by name.
    pub fn seeded(
        persona_prompt: &str,
        greeting_instruction: &str,
        display_name: Option<&str>,
    ) -> Self {
        let greeting = match display_name {
            Some(name) => format!("{greeting_instruction} The caller's name is {name}."),
            None => greeting_instruction.to_string(),
        };
        Self {
            messages: vec![
                ContextMessage {
                    role: Role::System,
                    content: persona_prompt.to_string(),
                },
                ContextMessage {
                    role: Role::System,
                    content: greeting,
                },
            ],
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(ContextMessage {
            role: Role::User,
            content: text.into(),
        });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(ContextMessage {
            role: Role::Assistant,
            content: text.into(),
        });
    }

    /// Clone the current history for a generation call.
    pub fn snapshot(&self) -> Vec<ContextMessage> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[ContextMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_context_shape() {
        let ctx = ConversationContext::seeded("You are a test agent.", "Say hello.", None);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.messages()[0].role, Role::System);
        assert_eq!(ctx.messages()[1].content, "Say hello.");
    }

    #[test]
    fn test_seeded_context_with_display_name() {
        let ctx = ConversationContext::seeded("persona", "Say hello.", Some("Alice"));
        assert!(ctx.messages()[1].content.contains("Alice"));
        assert!(ctx.messages()[1].content.starts_with("Say hello."));
    }

    #[test]
    fn test_append_order_preserved() {
        let mut ctx = ConversationContext::seeded("p", "g", None);
        ctx.push_user("one");
        ctx.push_assistant("two");
        ctx.push_user("three");

        let roles: Vec<Role> = ctx.messages()[2..].iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(ctx.messages()[4].content, "three");
    }

    #[test]
    fn test_role_serialization() {
        let msg = ContextMessage {
            role: Role::Assistant,
            content: "hi".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
