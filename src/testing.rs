use crate::cooldown::Clock;
use crate::error::{CompletionError, HistoryError, StoreError};
use crate::groq::CompletionProvider;
use crate::memory::FactStore;
use crate::message::{Author, HistoryMessage, HistorySource};
use crate::models::CompletionRequest;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, secs: i64) {
        *self.now.lock().unwrap() += Duration::seconds(secs);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Answers from a queue; answers `"ok"` once the queue runs dry.
#[derive(Default)]
pub struct ScriptedProvider {
    answers: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, answer: Result<String, CompletionError>) -> Self {
        self.answers.lock().unwrap().push_back(answer);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()))
    }
}

/// Serves a fixed newest-first channel history.
#[derive(Default)]
pub struct CannedHistory {
    messages: Vec<HistoryMessage>,
    calls: Mutex<Vec<(u64, u64, u8)>>,
}

impl CannedHistory {
    pub fn new(messages: Vec<HistoryMessage>) -> Self {
        Self {
            messages,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(u64, u64, u8)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistorySource for CannedHistory {
    async fn messages_before(
        &self,
        channel_id: u64,
        before: u64,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>, HistoryError> {
        self.calls.lock().unwrap().push((channel_id, before, limit));
        Ok(self
            .messages
            .iter()
            .filter(|m| m.id < before)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// A channel the assistant cannot read.
pub struct FailingHistory;

#[async_trait]
impl HistorySource for FailingHistory {
    async fn messages_before(
        &self,
        _channel_id: u64,
        _before: u64,
        _limit: u8,
    ) -> Result<Vec<HistoryMessage>, HistoryError> {
        Err(HistoryError::Fetch("Missing Access".into()))
    }
}

/// Never answers. Pair with a short call timeout.
pub struct StalledHistory;

#[async_trait]
impl HistorySource for StalledHistory {
    async fn messages_before(
        &self,
        _channel_id: u64,
        _before: u64,
        _limit: u8,
    ) -> Result<Vec<HistoryMessage>, HistoryError> {
        std::future::pending().await
    }
}

pub fn history_message(id: u64, name: &str, content: &str, is_bot: bool) -> HistoryMessage {
    HistoryMessage {
        id,
        author: Author {
            id: 1000 + id,
            display_name: name.to_string(),
            is_bot,
        },
        content: content.to_string(),
    }
}

pub struct OfflineStore;

#[async_trait]
impl FactStore for OfflineStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: String) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn keys(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Never answers. Pair with a short call timeout.
pub struct StalledStore;

#[async_trait]
impl FactStore for StalledStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: String) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn keys(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
        std::future::pending().await
    }
}
