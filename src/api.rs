//! # Collaborator contracts.
//!
//! The runtime does not implement a posting service client or a text
//! generation engine; it consumes them through these seams. Bot logic
//! composes both inside registered workers and loop tasks, consulting the
//! [`RateLimiter`](crate::RateLimiter) before every outbound call and
//! recording the call after it actually happened.
//!
//! Endpoints are identified by the same path strings the limiter keys on
//! (e.g. `"/statuses/mentions_timeline"`, `"/statuses/update"`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// One message on the posting service: a mention to answer or a post made
/// by this bot.
///
/// Serde-derived so it round-trips through the store as a record or a list
/// entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Service-assigned identifier.
    pub id: u64,
    /// Author handle, without any leading marker.
    pub author: String,
    /// Full text.
    pub text: String,
    /// Identifier of the message this one replies to, if any.
    pub in_reply_to: Option<u64>,
    /// Whether the bot has already answered this message.
    pub answered: bool,
}

/// Client for the posting/social service.
#[async_trait]
pub trait PostingClient: Send + Sync {
    /// Fetches messages mentioning the bot, newest last.
    async fn fetch_mentions(&self) -> Result<Vec<Message>, TaskError>;

    /// Posts `text`, optionally as a reply, returning the created message.
    async fn post(&self, text: &str, in_reply_to: Option<u64>) -> Result<Message, TaskError>;
}

/// Text generation engine.
///
/// Synchronous and potentially slow; callers invoke it from inside a loop
/// task, whose gate already serializes concurrent generation for that
/// task.
pub trait TextEngine: Send + Sync {
    /// Generates a reply seeded with `seed`, at most `max_len` characters.
    fn generate(&self, seed: &str, max_len: usize) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Value;

    #[test]
    fn message_round_trips_through_the_value_model() {
        let msg = Message {
            id: 42,
            author: "ada".into(),
            text: "@magpie hello there".into(),
            in_reply_to: None,
            answered: false,
        };
        let value = Value::record(&msg).unwrap();
        let back: Message = value.to_record().unwrap();
        assert_eq!(back, msg);
    }

    struct CannedClient {
        canned: Vec<Message>,
    }

    #[async_trait]
    impl PostingClient for CannedClient {
        async fn fetch_mentions(&self) -> Result<Vec<Message>, TaskError> {
            Ok(self.canned.clone())
        }

        async fn post(
            &self,
            text: &str,
            in_reply_to: Option<u64>,
        ) -> Result<Message, TaskError> {
            Ok(Message {
                id: 1,
                author: "magpie".into(),
                text: text.to_string(),
                in_reply_to,
                answered: false,
            })
        }
    }

    struct Parrot;

    impl TextEngine for Parrot {
        fn generate(&self, seed: &str, max_len: usize) -> String {
            seed.chars().take(max_len).collect()
        }
    }

    #[tokio::test]
    async fn seams_compose_into_a_reply_flow() {
        let client = CannedClient {
            canned: vec![Message {
                id: 7,
                author: "ada".into(),
                text: "say something".into(),
                in_reply_to: None,
                answered: false,
            }],
        };
        let engine = Parrot;

        let mentions = client.fetch_mentions().await.unwrap();
        let reply_text = engine.generate(&mentions[0].text, 280);
        let posted = client.post(&reply_text, Some(mentions[0].id)).await.unwrap();

        assert_eq!(posted.in_reply_to, Some(7));
        assert_eq!(posted.text, "say something");
    }
}
