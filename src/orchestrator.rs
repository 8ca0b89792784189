//! Request orchestration: one addressed message in, one [`Reply`] out.
//!
//! Nothing here returns an error. Every failure is logged and turned into a
//! user-facing reply so the event loop keeps running.

use crate::classifier::{
    classify, Classification, TranslationRequest, MAX_TRANSLATION_LIMIT, MIN_TRANSLATION_LIMIT,
};
use crate::commands::PREFIX;
use crate::cooldown::{Admission, Clock, CooldownGate};
use crate::error::{CompletionError, HistoryError, StoreError};
use crate::groq::CompletionProvider;
use crate::language::{Language, LanguageResolver};
use crate::memory::{FactStore, Forgotten, MemoryBook, UserMemory};
use crate::message::{Author, HistoryMessage, HistorySource, IncomingMessage, Reply, Tone};
use crate::models::{ChatMessage, CompletionRequest};
use crate::persona::{assemble, build_system_prompt, PromptContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const RATE_LIMITED: &str =
    "Oops, I'm overwhelmed right now (rate limit)! 🤯 Try again in a few seconds.";
pub const DISABLED: &str = "Sorry, this bot has been disabled.";
pub const EMPTY_RESPONSE: &str = "Sorry, I got an empty response. Try asking again.";
pub const NOTHING_TO_TRANSLATE: &str = "No messages found above this command to translate.";
pub const MEMORY_OFFLINE: &str = "🧠 Memory is offline right now. Try again in a bit.";

pub struct OrchestratorSettings {
    pub model: String,
    /// Upper bound for each external call.
    pub call_timeout: Duration,
}

pub struct Orchestrator {
    provider: Arc<dyn CompletionProvider>,
    history: Arc<dyn HistorySource>,
    memory: MemoryBook,
    cooldowns: CooldownGate,
    resolver: LanguageResolver,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        history: Arc<dyn HistorySource>,
        store: Arc<dyn FactStore>,
        resolver: LanguageResolver,
        cooldowns: CooldownGate,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            provider,
            history,
            memory: MemoryBook::new(store, settings.call_timeout),
            cooldowns,
            resolver,
            clock,
            settings,
        }
    }

    /// Handles an addressed message whose effective prompt is `prompt`.
    pub async fn respond(&self, message: &IncomingMessage, prompt: &str) -> Reply {
        match classify(prompt) {
            Classification::InvalidLimit { requested } => {
                info!(user_id = message.author.id, requested = %requested, "translation limit out of range");
                Reply::text(format!(
                    "Sorry, the message limit must be between {} and {}.",
                    MIN_TRANSLATION_LIMIT, MAX_TRANSLATION_LIMIT
                ))
            }
            Classification::Translate(request) => self.translate(message, prompt, request).await,
            Classification::Chat(prompt) => self.converse(message, &prompt).await,
        }
    }

    async fn translate(
        &self,
        message: &IncomingMessage,
        prompt: &str,
        request: TranslationRequest,
    ) -> Reply {
        let user_id = message.author.id;
        let language = self.resolver.resolve(prompt, &message.roles);

        let permit = match self.cooldowns.check(user_id, self.clock.now()) {
            Admission::Allowed(permit) => permit,
            Admission::Rejected { remaining_secs } => {
                info!(user_id, remaining_secs, "translator on cooldown");
                return Reply::text(cooldown_message(language, remaining_secs));
            }
            Admission::InFlight => return Reply::text(in_flight_message(language)),
        };

        let transcript = match self.fetch_history(message, request.limit).await {
            Ok(transcript) => transcript,
            Err(e) => {
                error!(user_id, "history fetch failed: {}", e);
                return Reply::text(format!("Sorry, translation failed. Error: {}", e));
            }
        };

        if transcript.is_empty() {
            return Reply::text(NOTHING_TO_TRANSLATE);
        }

        match self
            .complete(translation_prompt(&request, &transcript), 0.0, 2048)
            .await
        {
            Ok(text) if text.trim().is_empty() => {
                warn!(user_id, "empty translation from provider");
                Reply::text(EMPTY_RESPONSE)
            }
            Ok(text) => {
                permit.record(self.clock.now());
                info!(
                    user_id,
                    messages = transcript.len(),
                    target = %request.target_language,
                    "translation delivered"
                );
                Reply::titled(
                    format!(
                        "🌐 Translation ({} Messages to {})",
                        transcript.len(),
                        capitalize(&request.target_language)
                    ),
                    text,
                    Tone::Translation,
                )
            }
            Err(e) => failure_reply(&e, "translation failed"),
        }
    }

    /// Up to `limit` human messages before the trigger, oldest first.
    async fn fetch_history(
        &self,
        message: &IncomingMessage,
        limit: u32,
    ) -> Result<Vec<HistoryMessage>, HistoryError> {
        let fetch = u8::try_from(limit + 1).unwrap_or(u8::MAX);
        let timeout = self.settings.call_timeout;

        let mut messages = tokio::time::timeout(
            timeout,
            self.history
                .messages_before(message.channel.id, message.id, fetch),
        )
        .await
        .map_err(|_| HistoryError::Timeout(timeout))??;

        messages.reverse();
        messages.retain(|m| !m.author.is_bot && m.id != message.id);
        let excess = messages.len().saturating_sub(limit as usize);
        messages.drain(..excess);

        Ok(messages)
    }

    async fn converse(&self, message: &IncomingMessage, prompt: &str) -> Reply {
        let user_id = message.author.id;
        let language = self.resolver.resolve(prompt, &message.roles);

        let rails = match self.memory.rails().await {
            Ok(rails) => rails,
            Err(e) => return store_failure(&e),
        };

        let memory = match self.memory.load(user_id).await {
            Ok(memory) => memory,
            Err(e @ StoreError::Corrupt { .. }) => {
                warn!(user_id, "ignoring unreadable memory: {}", e);
                UserMemory::default()
            }
            Err(e) => return store_failure(&e),
        };

        let system_prompt = build_system_prompt(&PromptContext {
            language,
            now: self.clock.now(),
            server_name: message
                .server
                .as_ref()
                .map_or("Direct Message", |server| server.name.as_str()),
            channel_name: &message.channel.name,
            user_display_name: &message.author.display_name,
            memory: &memory,
            rails: &rails,
        });
        let assembled = assemble(system_prompt, message.reply_to.as_ref(), prompt);

        match self.complete(assembled.segments, 0.7, 1024).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(user_id, "empty reply from provider");
                Reply::text(EMPTY_RESPONSE)
            }
            Ok(text) => Reply::Text(text),
            Err(e) => failure_reply(&e, "I failed to respond"),
        }
    }

    /// Rewrites `statement` as a short third-person fact and stores it.
    pub async fn remember(&self, author: &Author, statement: &str) -> Reply {
        let statement = statement.trim();
        if statement.is_empty() {
            return Reply::text(format!(
                "❌ Tell me what to remember, e.g. `{}ingat my birthday is Dec 10`.",
                PREFIX
            ));
        }

        // Fail fast before spending a completion call.
        if let Err(e) = self.memory.load(author.id).await {
            return store_failure(&e);
        }

        let cleaning_prompt = format!(
            "Change the following sentence into a concise third-person fact (max 10 words). \
             Example: 'My birthday is Dec 10' -> 'Their birthday is December 10th.' Sentence: '{}'",
            statement
        );
        let fact = match self
            .complete(
                vec![
                    ChatMessage::system("You are a concise fact cleaning machine."),
                    ChatMessage::user(cleaning_prompt),
                ],
                0.0,
                50,
            )
            .await
        {
            Ok(fact) => fact.trim().replace('"', ""),
            Err(CompletionError::RateLimited) => {
                warn!(user_id = author.id, "rate limited while cleaning a fact");
                return Reply::text(
                    "Oops, I'm overwhelmed while processing memory (rate limit)! Try again in a few seconds.",
                );
            }
            Err(e) => return failure_reply(&e, "I couldn't save that memory"),
        };

        if fact.is_empty() {
            return Reply::text(EMPTY_RESPONSE);
        }

        match self.memory.append_fact(author.id, fact.clone()).await {
            Ok(total) => Reply::titled(
                "✅ Fact Stored",
                format!("I now remember about you:\n>>> **{}**", fact),
                Tone::Success,
            )
            .with_footer(format!("Total facts stored: {}", total)),
            Err(e) => store_failure(&e),
        }
    }

    pub async fn list_facts(&self, author: &Author) -> Reply {
        let memory = match self.memory.load(author.id).await {
            Ok(memory) => memory,
            Err(e) => return store_failure(&e),
        };

        if memory.facts.is_empty() {
            return Reply::text(format!(
                "❌ No facts stored about you. Use `{}ingat [fact]`.",
                PREFIX
            ));
        }

        let body = memory
            .facts
            .iter()
            .enumerate()
            .map(|(i, fact)| format!("**{}.** {}", i + 1, fact))
            .collect::<Vec<_>>()
            .join("\n");

        Reply::titled(
            format!("🧠 Z-Bot's Notebook on {}", author.display_name),
            body,
            Tone::Info,
        )
        .with_footer(format!("Use {}lupa [number] to delete a fact.", PREFIX))
    }

    /// `selector` is a 1-based fact number, or `semua`/`all` to wipe everything.
    pub async fn forget(&self, author: &Author, selector: &str) -> Reply {
        let selector = selector.trim();

        if selector.eq_ignore_ascii_case("semua") || selector.eq_ignore_ascii_case("all") {
            return match self.memory.wipe(author.id).await {
                Ok(()) => Reply::text(
                    "✅ SUCCESS! All memory about you has been wiped. I'm now completely amnesiac.",
                ),
                Err(e) => store_failure(&e),
            };
        }

        let Ok(position) = selector.parse::<usize>() else {
            return Reply::text(
                "❌ Enter a valid fact number (e.g., 1, 2, 3) or the word 'semua'.",
            );
        };

        match self.memory.remove_fact(author.id, position).await {
            Ok(Forgotten::Fact(fact)) => Reply::titled(
                "🗑️ Fact Deleted",
                format!("I have forgotten:\n>>> **{}**", fact),
                Tone::Danger,
            ),
            Ok(Forgotten::NoSuchFact) => Reply::text(format!(
                "❌ Fact number '{}' is invalid. Check `{}daftar_ingatan` for available numbers.",
                selector, PREFIX
            )),
            Err(e) => store_failure(&e),
        }
    }

    /// Stores the built-in rails. Administrators only.
    pub async fn setup_persona(&self, is_admin: bool) -> Reply {
        if !is_admin {
            return Reply::text("❌ You need administrator permission to set up the rails.");
        }

        match self.memory.install_default_rails().await {
            Ok(()) => {
                info!("default rails installed");
                Reply::text("✅ SUCCESS! Core safety rails have been set up.")
            }
            Err(e) => store_failure(&e),
        }
    }

    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages,
            temperature,
            max_tokens,
        };
        let timeout = self.settings.call_timeout;

        tokio::time::timeout(timeout, self.provider.complete(&request))
            .await
            .map_err(|_| CompletionError::Timeout(timeout))?
    }
}

fn translation_prompt(request: &TranslationRequest, transcript: &[HistoryMessage]) -> Vec<ChatMessage> {
    let rendered = transcript
        .iter()
        .map(|m| format!("[{}]: {}", m.author.display_name, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        ChatMessage::system(format!(
            "You are a skilled translator and formatter. You must translate the user's provided chat \
             history into {} and output the result in a clean, itemized list format.",
            request.target_language
        )),
        ChatMessage::user(format!(
            "{}\n\nUse the chat data below, provide the translation result in a clean, itemized list \
             format, preserving the original username next to the translated text:\n\n\
             --- CHAT HISTORY ({} MESSAGES) ---\n{}",
            request.instruction(),
            transcript.len(),
            rendered
        )),
    ]
}

fn failure_reply(error: &CompletionError, what: &str) -> Reply {
    match error {
        CompletionError::RateLimited => {
            warn!("completion rate limited");
            Reply::text(RATE_LIMITED)
        }
        CompletionError::NotConfigured => Reply::text(DISABLED),
        other => {
            error!("completion failed: {}", other);
            Reply::text(format!("Sorry, {}. Error: {}", what, other))
        }
    }
}

fn store_failure(error: &StoreError) -> Reply {
    match error {
        StoreError::Corrupt { .. } => {
            error!("fact store record unreadable: {}", error);
            Reply::text(format!("❌ ERROR: Memory record is unreadable. {}", error))
        }
        _ => {
            error!("fact store offline: {}", error);
            Reply::text(MEMORY_OFFLINE)
        }
    }
}

fn cooldown_message(language: Language, remaining_secs: u64) -> String {
    match language {
        Language::Indonesian => format!(
            "Waduh, fitur translator lagi cooldown nih. Coba lagi dalam {} detik, ya.",
            remaining_secs
        ),
        _ => format!(
            "Sorry, the translator is on cooldown. Try again in {} seconds.",
            remaining_secs
        ),
    }
}

fn in_flight_message(language: Language) -> String {
    match language {
        Language::Indonesian => "Sabar, terjemahan lu yang sebelumnya masih diproses.".to_string(),
        _ => "Hold on, your previous translation is still running.".to_string(),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{RolePreference, TextDetection, DETECTION_MIN_CHARS};
    use crate::memory::{memory_key, InMemoryFactStore};
    use crate::message::{Place, ReferencedMessage};
    use crate::models::ChatRole;
    use crate::persona::NO_FACTS;
    use crate::testing::{
        history_message, CannedHistory, FailingHistory, FakeClock, OfflineStore, ScriptedProvider,
        StalledHistory,
    };

    const USER: u64 = 11;
    const ID_ROLE: u64 = 77;

    struct Harness {
        orchestrator: Orchestrator,
        provider: Arc<ScriptedProvider>,
        history: Arc<CannedHistory>,
        cooldowns: CooldownGate,
        clock: Arc<FakeClock>,
        store: Arc<InMemoryFactStore>,
    }

    fn no_detection(_: &str) -> Option<Language> {
        None
    }

    fn resolver() -> LanguageResolver {
        LanguageResolver::with_strategies(
            vec![
                Box::new(TextDetection::with_detector(DETECTION_MIN_CHARS, no_detection)),
                Box::new(RolePreference::new([(ID_ROLE, Language::Indonesian)].into_iter().collect())),
            ],
            Language::DEFAULT,
        )
    }

    fn build(
        provider: ScriptedProvider,
        history: Arc<dyn HistorySource>,
        store: Arc<dyn FactStore>,
        call_timeout: Duration,
    ) -> (Orchestrator, Arc<ScriptedProvider>, CooldownGate, Arc<FakeClock>) {
        let provider = Arc::new(provider);
        let cooldowns = CooldownGate::new(Duration::from_secs(300));
        let clock = Arc::new(FakeClock::new());
        let orchestrator = Orchestrator::new(
            provider.clone(),
            history,
            store,
            resolver(),
            cooldowns.clone(),
            clock.clone(),
            OrchestratorSettings {
                model: "test-model".into(),
                call_timeout,
            },
        );
        (orchestrator, provider, cooldowns, clock)
    }

    fn harness(provider: ScriptedProvider, history: Vec<HistoryMessage>) -> Harness {
        let store = Arc::new(InMemoryFactStore::new());
        let history = Arc::new(CannedHistory::new(history));
        let (orchestrator, provider, cooldowns, clock) = build(
            provider,
            history.clone(),
            store.clone(),
            Duration::from_secs(5),
        );
        Harness {
            orchestrator,
            provider,
            history,
            cooldowns,
            clock,
            store,
        }
    }

    fn author() -> Author {
        Author {
            id: USER,
            display_name: "Sari".into(),
            is_bot: false,
        }
    }

    fn message(prompt: &str) -> IncomingMessage {
        IncomingMessage {
            id: 100,
            author: author(),
            content: prompt.into(),
            reply_to: None,
            channel: Place {
                id: 9,
                name: "general".into(),
            },
            server: Some(Place {
                id: 1,
                name: "Warung".into(),
            }),
            roles: Vec::new(),
        }
    }

    fn chat_history() -> Vec<HistoryMessage> {
        // Newest first, as a channel returns it.
        vec![
            history_message(99, "Budi", "selamat pagi", false),
            history_message(98, "Helper", "beep", true),
            history_message(97, "Ana", "apa kabar", false),
        ]
    }

    fn title_of(reply: &Reply) -> &str {
        match reply {
            Reply::Titled { title, .. } => title,
            Reply::Text(text) => panic!("expected titled reply, got text: {}", text),
        }
    }

    #[tokio::test]
    async fn english_chat_without_facts() {
        let h = harness(ScriptedProvider::new().answer(Ok("Hi Sari!".into())), Vec::new());

        let reply = h.orchestrator.respond(&message("hello there"), "hello there").await;
        assert_eq!(reply, Reply::text("Hi Sari!"));

        let requests = h.provider.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "test-model");
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.max_tokens, 1024);
        assert_eq!(request.messages.len(), 2);

        let system = &request.messages[0].content;
        assert!(system.contains(NO_FACTS));
        assert!(system.contains("Sorry, I can't directly read chat history"));
        assert!(!system.contains("Waduh"));
        assert_eq!(request.messages[1], ChatMessage::user("hello there"));
    }

    #[tokio::test]
    async fn indonesian_role_gets_localized_persona_and_stored_facts() {
        let h = harness(ScriptedProvider::new(), Vec::new());
        h.store
            .set(
                &memory_key(USER),
                r#"{"facts":["Their cat is Miso."],"preferences":{}}"#.into(),
            )
            .await
            .unwrap();

        let mut msg = message("apa kabar?");
        msg.roles = vec![ID_ROLE];
        h.orchestrator.respond(&msg, "apa kabar?").await;

        let system = &h.provider.requests()[0].messages[0].content;
        assert!(system.contains("Lu adalah asisten digital"));
        assert!(system.contains("Waduh, gw gak bisa liat isi chat langsung"));
        assert!(!system.contains("Sorry, I can't directly read chat history"));
        assert!(system.contains("Their cat is Miso."));
    }

    #[tokio::test]
    async fn reply_to_assistant_is_sent_as_assistant_turn() {
        let h = harness(ScriptedProvider::new(), Vec::new());
        let mut msg = message("and her age?");
        msg.reply_to = Some(ReferencedMessage {
            author: Author {
                id: 1,
                display_name: "Z-Bot".into(),
                is_bot: true,
            },
            content: "Miso sounds lovely.".into(),
            from_assistant: true,
        });

        h.orchestrator.respond(&msg, "and her age?").await;

        let roles: Vec<ChatRole> = h.provider.requests()[0]
            .messages
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec![ChatRole::System, ChatRole::Assistant, ChatRole::User]);
    }

    #[tokio::test]
    async fn empty_output_is_reported() {
        let h = harness(ScriptedProvider::new().answer(Ok("   ".into())), Vec::new());
        let reply = h.orchestrator.respond(&message("hi"), "hi").await;
        assert_eq!(reply, Reply::text(EMPTY_RESPONSE));
    }

    #[tokio::test]
    async fn provider_failures_are_classified() {
        let h = harness(
            ScriptedProvider::new()
                .answer(Err(CompletionError::RateLimited))
                .answer(Err(CompletionError::Api {
                    status: 500,
                    body: "upstream exploded".into(),
                }))
                .answer(Err(CompletionError::NotConfigured)),
            Vec::new(),
        );

        assert_eq!(h.orchestrator.respond(&message("hi"), "hi").await, Reply::text(RATE_LIMITED));

        match h.orchestrator.respond(&message("hi"), "hi").await {
            Reply::Text(text) => {
                assert!(text.starts_with("Sorry, I failed to respond. Error:"));
                assert!(text.contains("upstream exploded"));
            }
            other => panic!("unexpected reply {:?}", other),
        }

        assert_eq!(h.orchestrator.respond(&message("hi"), "hi").await, Reply::text(DISABLED));
    }

    #[tokio::test]
    async fn offline_store_fails_fast() {
        let (orchestrator, provider, _, _) = build(
            ScriptedProvider::new(),
            Arc::new(CannedHistory::default()),
            Arc::new(OfflineStore),
            Duration::from_secs(5),
        );

        assert_eq!(orchestrator.respond(&message("hi"), "hi").await, Reply::text(MEMORY_OFFLINE));
        assert_eq!(orchestrator.remember(&author(), "I like tea").await, Reply::text(MEMORY_OFFLINE));
        assert_eq!(orchestrator.list_facts(&author()).await, Reply::text(MEMORY_OFFLINE));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn translation_builds_transcript_in_order() {
        let h = harness(
            ScriptedProvider::new().answer(Ok("- [Ana]: how are you\n- [Budi]: good morning".into())),
            chat_history(),
        );
        let prompt = "translate to english [2]";

        let reply = h.orchestrator.respond(&message(prompt), prompt).await;
        assert_eq!(title_of(&reply), "🌐 Translation (2 Messages to English)");
        assert_eq!(h.history.calls(), vec![(9, 100, 3)]);

        let request = &h.provider.requests()[0];
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_tokens, 2048);
        assert!(request.messages[0].content.contains("into english"));

        let user = &request.messages[1].content;
        assert!(user.starts_with("Please translate the following 2 messages into english."));
        assert!(user.contains("--- CHAT HISTORY (2 MESSAGES) ---\n[Ana]: apa kabar\n[Budi]: selamat pagi"));
        assert!(!user.contains("beep"));
    }

    #[tokio::test]
    async fn translation_uses_lead_in() {
        let h = harness(ScriptedProvider::new(), chat_history());
        let prompt = "keep it formal please translate to German [2]";
        h.orchestrator.respond(&message(prompt), prompt).await;

        let user = &h.provider.requests()[0].messages[1].content;
        assert!(user.starts_with("keep it formal please\n\n"));
    }

    #[tokio::test]
    async fn out_of_range_limit_touches_nothing() {
        let h = harness(ScriptedProvider::new(), chat_history());
        for prompt in ["translate to French [1]", "translate to French [16]"] {
            let reply = h.orchestrator.respond(&message(prompt), prompt).await;
            assert_eq!(
                reply,
                Reply::text("Sorry, the message limit must be between 2 and 15.")
            );
        }
        assert!(h.history.calls().is_empty());
        assert!(h.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn single_qualifying_message_still_translates() {
        let h = harness(
            ScriptedProvider::new(),
            vec![
                history_message(99, "Budi", "selamat pagi", false),
                history_message(98, "Helper", "beep", true),
            ],
        );
        let prompt = "translate to French [3]";

        let reply = h.orchestrator.respond(&message(prompt), prompt).await;
        assert_eq!(title_of(&reply), "🌐 Translation (1 Messages to French)");
    }

    #[tokio::test]
    async fn empty_history_does_not_start_cooldown() {
        let h = harness(ScriptedProvider::new(), Vec::new());
        let prompt = "translate to French [3]";

        for _ in 0..2 {
            let reply = h.orchestrator.respond(&message(prompt), prompt).await;
            assert_eq!(reply, Reply::text(NOTHING_TO_TRANSLATE));
        }
        assert!(h.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn second_translation_inside_window_is_rejected() {
        let h = harness(ScriptedProvider::new(), chat_history());
        let prompt = "translate to French [2]";

        h.orchestrator.respond(&message(prompt), prompt).await;
        h.clock.advance(10);
        let reply = h.orchestrator.respond(&message(prompt), prompt).await;

        assert_eq!(
            reply,
            Reply::text("Sorry, the translator is on cooldown. Try again in 290 seconds.")
        );
        assert_eq!(h.provider.requests().len(), 1);
        assert_eq!(h.history.calls().len(), 1);

        h.clock.advance(290);
        let reply = h.orchestrator.respond(&message(prompt), prompt).await;
        assert_eq!(title_of(&reply), "🌐 Translation (2 Messages to French)");
    }

    #[tokio::test]
    async fn cooldown_message_follows_resolved_language() {
        let h = harness(ScriptedProvider::new(), chat_history());
        let prompt = "translate to French [2]";
        let mut msg = message(prompt);
        msg.roles = vec![ID_ROLE];

        h.orchestrator.respond(&msg, prompt).await;
        let reply = h.orchestrator.respond(&msg, prompt).await;
        assert_eq!(
            reply,
            Reply::text("Waduh, fitur translator lagi cooldown nih. Coba lagi dalam 300 detik, ya.")
        );
    }

    #[tokio::test]
    async fn failed_translation_does_not_start_cooldown() {
        let h = harness(
            ScriptedProvider::new().answer(Err(CompletionError::Api {
                status: 503,
                body: "busy".into(),
            })),
            chat_history(),
        );
        let prompt = "translate to French [2]";

        match h.orchestrator.respond(&message(prompt), prompt).await {
            Reply::Text(text) => assert!(text.starts_with("Sorry, translation failed. Error:")),
            other => panic!("unexpected reply {:?}", other),
        }

        let reply = h.orchestrator.respond(&message(prompt), prompt).await;
        assert_eq!(title_of(&reply), "🌐 Translation (2 Messages to French)");
    }

    #[tokio::test]
    async fn rate_limited_translation_does_not_start_cooldown() {
        let h = harness(
            ScriptedProvider::new().answer(Err(CompletionError::RateLimited)),
            chat_history(),
        );
        let prompt = "translate to French [2]";

        let reply = h.orchestrator.respond(&message(prompt), prompt).await;
        assert_eq!(reply, Reply::text(RATE_LIMITED));
        assert_eq!(h.cooldowns.remaining(USER, h.clock.now()), None);

        let reply = h.orchestrator.respond(&message(prompt), prompt).await;
        assert_eq!(title_of(&reply), "🌐 Translation (2 Messages to French)");
    }

    #[tokio::test]
    async fn unreadable_history_fails_and_releases_the_gate() {
        let (orchestrator, provider, cooldowns, clock) = build(
            ScriptedProvider::new(),
            Arc::new(FailingHistory),
            Arc::new(InMemoryFactStore::new()),
            Duration::from_secs(5),
        );
        let prompt = "translate to French [2]";

        for _ in 0..2 {
            let reply = orchestrator.respond(&message(prompt), prompt).await;
            assert_eq!(
                reply,
                Reply::text("Sorry, translation failed. Error: history fetch failed: Missing Access")
            );
        }
        assert!(provider.requests().is_empty());
        assert!(matches!(cooldowns.check(USER, clock.now()), Admission::Allowed(_)));
    }

    #[tokio::test]
    async fn stalled_history_times_out_and_releases_the_gate() {
        let (orchestrator, provider, cooldowns, clock) = build(
            ScriptedProvider::new(),
            Arc::new(StalledHistory),
            Arc::new(InMemoryFactStore::new()),
            Duration::from_millis(20),
        );
        let prompt = "translate to French [2]";

        match orchestrator.respond(&message(prompt), prompt).await {
            Reply::Text(text) => {
                assert!(text.starts_with("Sorry, translation failed. Error: history fetch timed out"))
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(provider.requests().is_empty());
        assert_eq!(cooldowns.remaining(USER, clock.now()), None);
        assert!(matches!(cooldowns.check(USER, clock.now()), Admission::Allowed(_)));
    }

    #[tokio::test]
    async fn translation_already_running_gets_its_own_reply() {
        let h = harness(ScriptedProvider::new(), chat_history());
        let prompt = "translate to French [2]";

        let running = match h.cooldowns.check(USER, h.clock.now()) {
            Admission::Allowed(permit) => permit,
            _ => panic!("gate should be open"),
        };

        let reply = h.orchestrator.respond(&message(prompt), prompt).await;
        assert_eq!(reply, Reply::text("Hold on, your previous translation is still running."));

        let mut msg = message(prompt);
        msg.roles = vec![ID_ROLE];
        let reply = h.orchestrator.respond(&msg, prompt).await;
        assert_eq!(
            reply,
            Reply::text("Sabar, terjemahan lu yang sebelumnya masih diproses.")
        );
        assert!(h.history.calls().is_empty());
        assert!(h.provider.requests().is_empty());

        drop(running);
        let reply = h.orchestrator.respond(&message(prompt), prompt).await;
        assert_eq!(title_of(&reply), "🌐 Translation (2 Messages to French)");
    }

    #[tokio::test]
    async fn remember_list_and_forget() {
        let h = harness(
            ScriptedProvider::new().answer(Ok("\"Their cat is Miso.\"\n".into())),
            Vec::new(),
        );
        let sari = author();

        match h.orchestrator.remember(&sari, "my cat is called Miso").await {
            Reply::Titled { title, body, footer, .. } => {
                assert_eq!(title, "✅ Fact Stored");
                assert!(body.contains("**Their cat is Miso.**"));
                assert_eq!(footer.as_deref(), Some("Total facts stored: 1"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
        let cleaning = &h.provider.requests()[0];
        assert_eq!(cleaning.max_tokens, 50);
        assert!(cleaning.messages[1].content.contains("'my cat is called Miso'"));

        match h.orchestrator.list_facts(&sari).await {
            Reply::Titled { title, body, .. } => {
                assert_eq!(title, "🧠 Z-Bot's Notebook on Sari");
                assert_eq!(body, "**1.** Their cat is Miso.");
            }
            other => panic!("unexpected reply {:?}", other),
        }

        assert_eq!(
            h.orchestrator.forget(&sari, "2").await,
            Reply::text("❌ Fact number '2' is invalid. Check `!daftar_ingatan` for available numbers.")
        );
        assert_eq!(
            h.orchestrator.forget(&sari, "two").await,
            Reply::text("❌ Enter a valid fact number (e.g., 1, 2, 3) or the word 'semua'.")
        );
        assert_eq!(title_of(&h.orchestrator.forget(&sari, "1").await), "🗑️ Fact Deleted");
        assert_eq!(
            h.orchestrator.list_facts(&sari).await,
            Reply::text("❌ No facts stored about you. Use `!ingat [fact]`.")
        );
    }

    #[tokio::test]
    async fn forget_everything() {
        let h = harness(ScriptedProvider::new(), Vec::new());
        h.store
            .set(&memory_key(USER), r#"{"facts":["a","b"]}"#.into())
            .await
            .unwrap();

        let reply = h.orchestrator.forget(&author(), "SEMUA").await;
        assert!(matches!(reply, Reply::Text(ref text) if text.starts_with("✅ SUCCESS!")));
        assert!(h.store.get(&memory_key(USER)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn setup_persona_requires_admin() {
        let h = harness(ScriptedProvider::new(), Vec::new());
        assert!(h.store.get(crate::memory::RAILS_KEY).await.unwrap().is_none());

        h.orchestrator.setup_persona(false).await;
        assert!(h.store.get(crate::memory::RAILS_KEY).await.unwrap().is_none());

        h.orchestrator.setup_persona(true).await;
        assert!(h.store.get(crate::memory::RAILS_KEY).await.unwrap().is_some());
    }

    #[test]
    fn capitalize_matches_title_style() {
        assert_eq!(capitalize("bahasa INDONESIA"), "Bahasa indonesia");
        assert_eq!(capitalize(""), "");
    }
}
