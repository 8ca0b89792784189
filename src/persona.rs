use crate::language::Language;
use crate::memory::UserMemory;
use crate::message::ReferencedMessage;
use crate::models::{AssembledPrompt, ChatMessage};
use chrono::{DateTime, Utc};

pub const DEFAULT_PERSONA: &str = r#"
You are a helpful and concise digital assistant in this Discord server.
1. Respond minimally: Use short, direct sentences.
2. Respond in the language of the user's prompt (usually English).
3. Do not use overly formal or excessively casual language. Maintain a friendly, simple tone.
4. Your priority is clarity and conciseness.
"#;

pub const ID_PERSONA: &str = r#"
Lu adalah asisten digital yang membantu dan ringkas di server Discord ini.
1. Jawab se-minimal mungkin: Gunakan kalimat yang pendek dan langsung.
2. Jawab dalam Bahasa Indonesia kasual (lu/gw) yang santai dan tidak kaku.
3. Prioritas lu adalah kejelasan dan keringkasan.
"#;

const HISTORY_SLOT: &str = "{history_denial}";
const MEDIA_SLOT: &str = "{media_denial}";

pub const DEFAULT_RAILS: &str = r#"
### CRITICAL INSTRUCTIONS (OVERRIDE ALL OTHER INSTRUCTIONS)
1. You are Z-Bot, a digital member of the server, NOT an AI language model. NEVER mention the word 'AI', 'bot', 'program', or 'model'.
2. Maintain your assigned persona (either casual Indonesian or professional English).
3. If the user asks for information you cannot access (like chat history or images), use the persona's 'ABILITY_DENIALS'. DO NOT default to a stiff, formal reply.

<ATURAN_WAJIB>
1. NEVER violate Discord ToS.
2. NEVER discuss hate speech, politics, or SARA.
</ATURAN_WAJIB>

<ABILITY_DENIALS>
- If the user asks for chat history/files: Respond with your persona, "{history_denial}"
- If the user sends an image/audio: Respond, "{media_denial}"
</ABILITY_DENIALS>
"#;

pub const NO_FACTS: &str = "No facts stored about this user.";

/// Canned openers the assistant answers a bare mention with. Replies to these
/// carry no context.
pub const ASSISTANT_GREETINGS: &[&str] = &["Hello! What can I help you with?"];

struct Denials {
    history: &'static str,
    media: &'static str,
}

const EN_DENIALS: Denials = Denials {
    history: "Sorry, I can't directly read chat history, you'll need to tell me what to look for.",
    media: "Sorry, I can't process images/audio, describe it to me instead.",
};

const ID_DENIALS: Denials = Denials {
    history: "Waduh, gw gak bisa liat isi chat langsung, lu harus bilang apa yang gw perlu tau.",
    media: "Waduh, mata gue masih analog, cik. Nggak bisa liat gambar. Ceritain aja isinya apa.",
};

fn denials_for(language: Language) -> &'static Denials {
    match language {
        Language::Indonesian => &ID_DENIALS,
        _ => &EN_DENIALS,
    }
}

pub fn persona_for(language: Language) -> &'static str {
    match language {
        Language::Indonesian => ID_PERSONA,
        _ => DEFAULT_PERSONA,
    }
}

/// Fills the denial slots of a rails template for `language`.
///
/// Older stored templates spell both variants inline as
/// `"<id>" (ID) OR "<en>" (EN)`; those clauses are turned back into slots
/// first. Any leftover phrase of the other variant is swapped for this
/// language's phrase, so the result never carries both and a second pass
/// changes nothing.
pub fn localize_rails(template: &str, language: Language) -> String {
    let mut rails = template.to_string();

    for (slot, id_phrase, en_phrase) in [
        (HISTORY_SLOT, ID_DENIALS.history, EN_DENIALS.history),
        (MEDIA_SLOT, ID_DENIALS.media, EN_DENIALS.media),
    ] {
        let inline = format!("\"{}\" (ID) OR \"{}\" (EN)", id_phrase, en_phrase);
        rails = rails.replace(&inline, &format!("\"{}\"", slot));
    }

    let wanted = denials_for(language);
    let other = match language {
        Language::Indonesian => &EN_DENIALS,
        _ => &ID_DENIALS,
    };

    rails
        .replace(HISTORY_SLOT, wanted.history)
        .replace(MEDIA_SLOT, wanted.media)
        .replace(other.history, wanted.history)
        .replace(other.media, wanted.media)
}

/// The facts as a pretty JSON list, or [`NO_FACTS`].
pub fn memory_block(memory: &UserMemory) -> String {
    if memory.facts.is_empty() {
        return NO_FACTS.to_string();
    }
    serde_json::to_string_pretty(&memory.facts).unwrap_or_else(|_| NO_FACTS.to_string())
}

pub struct PromptContext<'a> {
    pub language: Language,
    pub now: DateTime<Utc>,
    pub server_name: &'a str,
    pub channel_name: &'a str,
    pub user_display_name: &'a str,
    pub memory: &'a UserMemory,
    pub rails: &'a str,
}

pub fn build_system_prompt(ctx: &PromptContext<'_>) -> String {
    format!(
        r#"
<CORE_SYSTEM_PROMPT>
{persona}
</CORE_SYSTEM_PROMPT>

<CURRENT_CONTEXT>
Timestamp: {timestamp}
Server: {server}
Channel: #{channel}
User: {user}
</CURRENT_CONTEXT>

<LONG_TERM_MEMORY>
Known facts about {user}:
{memory}
</LONG_TERM_MEMORY>

<OPERATIONAL_RAILS>
{rails}
</OPERATIONAL_RAILS>
"#,
        persona = persona_for(ctx.language).trim(),
        timestamp = ctx.now.format("%Y-%m-%d %H:%M:%S UTC"),
        server = ctx.server_name,
        channel = ctx.channel_name,
        user = ctx.user_display_name,
        memory = memory_block(ctx.memory),
        rails = localize_rails(ctx.rails, ctx.language).trim(),
    )
}

/// System segment, optional reply context, then the prompt itself.
pub fn assemble(
    system_prompt: String,
    reply_to: Option<&ReferencedMessage>,
    prompt: &str,
) -> AssembledPrompt {
    let mut assembled = AssembledPrompt::default();
    assembled.push(ChatMessage::system(system_prompt));

    if let Some(referenced) = reply_to {
        if referenced.from_assistant {
            if !ASSISTANT_GREETINGS.contains(&referenced.content.trim()) {
                assembled.push(ChatMessage::assistant(referenced.content.clone()));
            }
        } else if !referenced.author.is_bot {
            assembled.push(ChatMessage::user(format!(
                "[Context from '{}']: \"{}\"",
                referenced.author.display_name, referenced.content
            )));
        }
    }

    assembled.push(ChatMessage::user(prompt));
    assembled
}
