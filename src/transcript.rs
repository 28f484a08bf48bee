use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a conversation. Fields are private so a turn cannot change once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    role: Role,
    content: String,
    timestamp: DateTime<Local>,
}

impl Turn {
    fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            timestamp: Local::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}

/// Ordered user/assistant turns for one session.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    id: Uuid,
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            turns: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::new(Role::User, content.into()));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::new(Role::Assistant, content.into()));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drops every turn. The session id is kept.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Plain-text rendering used by the terminal chat.
    pub fn render_plain(&self) -> String {
        self.turns
            .iter()
            .map(|turn| {
                let who = match turn.role {
                    Role::User => "You",
                    Role::Assistant => "FoodHunter",
                };
                format!(
                    "{} {}: {}",
                    turn.timestamp.format("%H:%M:%S"),
                    who,
                    turn.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_new() {
        let transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert_eq!(transcript.len(), 0);
        assert!(transcript.last().is_none());
    }

    #[test]
    fn test_user_then_assistant_keeps_order_and_roles() {
        let mut transcript = Transcript::new();
        transcript.push_user("最近火锅店有什么新的甜品爆款？");
        transcript.push_assistant("# 💡 餐饮情报分析报告");

        let turns = transcript.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role(), Role::User);
        assert_eq!(turns[0].content(), "最近火锅店有什么新的甜品爆款？");
        assert_eq!(turns[1].role(), Role::Assistant);
        assert_eq!(turns[1].content(), "# 💡 餐饮情报分析报告");
        assert!(turns[0].timestamp() <= turns[1].timestamp());
    }

    #[test]
    fn test_clear_empties_any_length() {
        for n in [0usize, 1, 7, 64] {
            let mut transcript = Transcript::new();
            for i in 0..n {
                if i % 2 == 0 {
                    transcript.push_user(format!("q{}", i));
                } else {
                    transcript.push_assistant(format!("a{}", i));
                }
            }
            let id = transcript.id();
            transcript.clear();
            assert!(transcript.turns().is_empty());
            assert_eq!(transcript.id(), id);
        }
    }

    #[test]
    fn test_render_plain() {
        let mut transcript = Transcript::new();
        transcript.push_user("Hello");
        transcript.push_assistant("Hi there!");

        let rendered = transcript.render_plain();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("You: Hello"));
        assert!(lines[1].ends_with("FoodHunter: Hi there!"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
