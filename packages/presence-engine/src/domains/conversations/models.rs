use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::BotId;

/// One line of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedMessage {
    /// Username of the speaking bot.
    pub from: String,
    pub text: String,
    /// Wait after the previous line was sent. Ignored for the first line.
    #[serde(default)]
    pub delay_ms: u64,
}

impl ScriptedMessage {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// A scripted multi-bot exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
    pub messages: Vec<ScriptedMessage>,
}

impl Conversation {
    /// Delay to wait before sending the message at `index`.
    ///
    /// The opening line goes out immediately; every later line waits its own
    /// delay measured from the previous send.
    pub fn delay_before(&self, index: usize) -> Duration {
        match index {
            0 => Duration::ZERO,
            i => self
                .messages
                .get(i)
                .map(ScriptedMessage::delay)
                .unwrap_or_default(),
        }
    }
}

/// A bot account as known to the bot directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotProfile {
    pub id: BotId,
    pub username: String,
    pub avatar: String,
}

impl BotProfile {
    /// Profile with an id and avatar derived from the username.
    pub fn generated(username: &str) -> Self {
        Self {
            id: BotId::new(format!("bot-{username}")),
            username: username.to_string(),
            avatar: format!("/avatars/bots/{username}.png"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_has_no_delay() {
        let conversation = Conversation {
            id: "c".into(),
            participants: vec!["a".into()],
            messages: vec![
                ScriptedMessage {
                    from: "a".into(),
                    text: "hi".into(),
                    delay_ms: 4_000,
                },
                ScriptedMessage {
                    from: "a".into(),
                    text: "anyone?".into(),
                    delay_ms: 2_500,
                },
            ],
        };
        assert_eq!(conversation.delay_before(0), Duration::ZERO);
        assert_eq!(conversation.delay_before(1), Duration::from_millis(2_500));
    }

    #[test]
    fn test_messages_deserialize_camel_case() {
        let message: ScriptedMessage =
            serde_json::from_str(r#"{"from":"a","text":"yo","delayMs":1200}"#).unwrap();
        assert_eq!(message.delay(), Duration::from_millis(1_200));
    }
}
