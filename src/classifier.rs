use regex_lite::Regex;
use std::sync::OnceLock;

pub const MIN_TRANSLATION_LIMIT: u32 = 2;
pub const MAX_TRANSLATION_LIMIT: u32 = 15;

fn directive() -> &'static Regex {
    static DIRECTIVE: OnceLock<Regex> = OnceLock::new();
    DIRECTIVE.get_or_init(|| {
        Regex::new(r"(?i)translate to (.*?)\s*\[(\d+)\]")
            .expect("translation directive regex is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub target_language: String,
    pub limit: u32,
    /// Text before the directive, trimmed. `None` when nothing precedes it.
    pub lead_in: Option<String>,
}

impl TranslationRequest {
    /// The instruction sent ahead of the transcript.
    pub fn instruction(&self) -> String {
        match &self.lead_in {
            Some(lead_in) => lead_in.clone(),
            None => format!(
                "Please translate the following {} messages into {}.",
                self.limit, self.target_language
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Translate(TranslationRequest),
    /// The directive matched but the bracket count is outside the accepted range.
    InvalidLimit { requested: String },
    Chat(String),
}

pub fn classify(prompt: &str) -> Classification {
    let Some(captures) = directive().captures(prompt) else {
        return Classification::Chat(prompt.to_string());
    };

    let (Some(whole), Some(target), Some(count)) = (captures.get(0), captures.get(1), captures.get(2))
    else {
        return Classification::Chat(prompt.to_string());
    };

    let limit = match count.as_str().parse::<u32>() {
        Ok(limit) if (MIN_TRANSLATION_LIMIT..=MAX_TRANSLATION_LIMIT).contains(&limit) => limit,
        _ => {
            return Classification::InvalidLimit {
                requested: count.as_str().to_string(),
            }
        }
    };

    let lead_in = prompt[..whole.start()].trim();

    Classification::Translate(TranslationRequest {
        target_language: target.as_str().trim().to_string(),
        limit,
        lead_in: (!lead_in.is_empty()).then(|| lead_in.to_string()),
    })
}
