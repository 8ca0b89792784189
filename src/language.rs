//! Reply-language resolution.
//!
//! Resolution is an ordered cascade of [`LanguageStrategy`] values. The first
//! strategy that returns a language wins; when none does the resolver falls
//! back to [`Language::DEFAULT`]. Every strategy is a pure function of the
//! prompt text and the caller's role ids.

use std::collections::HashMap;
use std::panic;
use tracing::debug;

/// First lines at or below this many characters skip statistical detection.
pub const DETECTION_MIN_CHARS: usize = 20;

/// Detector results below this confidence are treated as no answer.
const MIN_DETECTION_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    English,
    Indonesian,
    Vietnamese,
    Thai,
    Chinese,
    Filipino,
}

impl Language {
    pub const DEFAULT: Language = Language::English;

    /// Order in which role-mapped languages are considered.
    pub const PRIORITY: [Language; 6] = [
        Language::English,
        Language::Indonesian,
        Language::Vietnamese,
        Language::Thai,
        Language::Chinese,
        Language::Filipino,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Indonesian => "id",
            Language::Vietnamese => "vi",
            Language::Thai => "th",
            Language::Chinese => "zh",
            Language::Filipino => "tl",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "en" => Some(Language::English),
            "id" => Some(Language::Indonesian),
            "vi" => Some(Language::Vietnamese),
            "th" => Some(Language::Thai),
            "zh" | "zh-cn" | "zh-tw" => Some(Language::Chinese),
            "tl" | "fil" => Some(Language::Filipino),
            _ => None,
        }
    }
}

/// One stage of the resolution cascade.
pub trait LanguageStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, prompt: &str, roles: &[u64]) -> Option<Language>;
}

pub type Detector = fn(&str) -> Option<Language>;

/// Statistical detection on the first line of the prompt.
pub struct TextDetection {
    min_chars: usize,
    detect: Detector,
}

impl TextDetection {
    pub fn new(min_chars: usize) -> Self {
        Self::with_detector(min_chars, detect_with_whatlang)
    }

    pub fn with_detector(min_chars: usize, detect: Detector) -> Self {
        Self { min_chars, detect }
    }
}

impl LanguageStrategy for TextDetection {
    fn name(&self) -> &'static str {
        "text-detection"
    }

    fn resolve(&self, prompt: &str, _roles: &[u64]) -> Option<Language> {
        let first_line = prompt.trim().lines().next().unwrap_or_default().trim();
        if first_line.chars().count() <= self.min_chars {
            return None;
        }

        // A misbehaving detector must not take the request down with it.
        let detect = self.detect;
        panic::catch_unwind(|| detect(first_line)).ok().flatten()
    }
}

pub fn detect_with_whatlang(text: &str) -> Option<Language> {
    let info = whatlang::detect(text)?;
    if info.confidence() < MIN_DETECTION_CONFIDENCE {
        return None;
    }

    match info.lang() {
        whatlang::Lang::Eng => Some(Language::English),
        whatlang::Lang::Ind => Some(Language::Indonesian),
        whatlang::Lang::Vie => Some(Language::Vietnamese),
        whatlang::Lang::Tha => Some(Language::Thai),
        whatlang::Lang::Cmn => Some(Language::Chinese),
        whatlang::Lang::Tgl => Some(Language::Filipino),
        _ => None,
    }
}

/// Maps server role ids to the language their holders prefer.
#[derive(Debug, Clone, Default)]
pub struct RoleLanguageTable {
    roles: HashMap<u64, Language>,
}

impl RoleLanguageTable {
    pub fn insert(&mut self, role_id: u64, language: Language) {
        self.roles.insert(role_id, language);
    }

    pub fn language_of(&self, role_id: u64) -> Option<Language> {
        self.roles.get(&role_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl FromIterator<(u64, Language)> for RoleLanguageTable {
    fn from_iter<I: IntoIterator<Item = (u64, Language)>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().collect(),
        }
    }
}

/// Picks the highest-priority language the caller holds a mapped role for.
pub struct RolePreference {
    table: RoleLanguageTable,
}

impl RolePreference {
    pub fn new(table: RoleLanguageTable) -> Self {
        Self { table }
    }
}

impl LanguageStrategy for RolePreference {
    fn name(&self) -> &'static str {
        "role-preference"
    }

    fn resolve(&self, _prompt: &str, roles: &[u64]) -> Option<Language> {
        Language::PRIORITY.into_iter().find(|language| {
            roles
                .iter()
                .any(|role| self.table.language_of(*role) == Some(*language))
        })
    }
}

pub struct LanguageResolver {
    strategies: Vec<Box<dyn LanguageStrategy>>,
    fallback: Language,
}

impl LanguageResolver {
    /// Detection first, then role preference, then [`Language::DEFAULT`].
    pub fn new(roles: RoleLanguageTable) -> Self {
        Self::with_strategies(
            vec![
                Box::new(TextDetection::new(DETECTION_MIN_CHARS)),
                Box::new(RolePreference::new(roles)),
            ],
            Language::DEFAULT,
        )
    }

    pub fn with_strategies(strategies: Vec<Box<dyn LanguageStrategy>>, fallback: Language) -> Self {
        Self {
            strategies,
            fallback,
        }
    }

    pub fn resolve(&self, prompt: &str, roles: &[u64]) -> Language {
        for strategy in &self.strategies {
            if let Some(language) = strategy.resolve(prompt, roles) {
                debug!(strategy = strategy.name(), language = language.code(), "resolved reply language");
                return language;
            }
        }

        debug!(language = self.fallback.code(), "no strategy matched, using fallback language");
        self.fallback
    }
}
