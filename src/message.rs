use crate::error::HistoryError;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    pub display_name: String,
    pub is_bot: bool,
}

/// The message a trigger replies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencedMessage {
    pub author: Author,
    pub content: String,
    /// Written by this assistant (as opposed to any other bot).
    pub from_assistant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: u64,
    pub author: Author,
    pub content: String,
    pub reply_to: Option<ReferencedMessage>,
    pub channel: Place,
    pub server: Option<Place>,
    pub roles: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: u64,
    pub author: Author,
    pub content: String,
}

/// Earlier messages of a channel.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Up to `limit` messages immediately preceding `before`, newest first.
    async fn messages_before(
        &self,
        channel_id: u64,
        before: u64,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>, HistoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Info,
    Danger,
    Translation,
    Ranking,
}

/// What goes back to the user, attached to the triggering message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Titled {
        title: String,
        body: String,
        footer: Option<String>,
        tone: Tone,
    },
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Reply::Text(content.into())
    }

    pub fn titled(title: impl Into<String>, body: impl Into<String>, tone: Tone) -> Self {
        Reply::Titled {
            title: title.into(),
            body: body.into(),
            footer: None,
            tone,
        }
    }

    pub fn with_footer(self, text: impl Into<String>) -> Self {
        match self {
            Reply::Titled {
                title, body, tone, ..
            } => Reply::Titled {
                title,
                body,
                footer: Some(text.into()),
                tone,
            },
            plain => plain,
        }
    }
}
