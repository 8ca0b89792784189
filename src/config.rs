use crate::error::ConfigError;
use crate::language::{Language, RoleLanguageTable};
use std::env;
use std::time::Duration;

pub const DEFAULT_GROQ_ENDPOINT: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.1-8b-instant";

pub struct Config {
    pub discord_token: String,
    pub groq_api_key: Option<String>,
    pub groq_endpoint: String,
    pub groq_model: String,
    pub translator_cooldown: Duration,
    pub request_timeout: Duration,
    pub language_roles: RoleLanguageTable,
    pub level_role_a: Option<u64>,
    pub level_role_b: Option<u64>,
    pub keep_alive_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let discord_token =
            env::var("DISCORD_TOKEN").map_err(|_| ConfigError::Missing("DISCORD_TOKEN"))?;

        let groq_api_key = env::var("GROQ_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        let groq_endpoint =
            env::var("GROQ_ENDPOINT").unwrap_or_else(|_| DEFAULT_GROQ_ENDPOINT.to_string());
        let groq_model = env::var("GROQ_MODEL").unwrap_or_else(|_| DEFAULT_GROQ_MODEL.to_string());

        let translator_cooldown =
            Duration::from_secs(parse_var("TRANSLATOR_COOLDOWN_SECS", 300)?);
        let request_timeout = Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 30)?);

        let language_roles = match env::var("LANGUAGE_ROLES") {
            Ok(raw) => parse_language_roles(&raw)?,
            Err(_) => RoleLanguageTable::default(),
        };

        let level_role_a = optional_var("LEVEL_ROLE_A_ID")?;
        let level_role_b = optional_var("LEVEL_ROLE_B_ID")?;
        let keep_alive_port = parse_var("KEEP_ALIVE_PORT", 5000)?;

        Ok(Self {
            discord_token,
            groq_api_key,
            groq_endpoint,
            groq_model,
            translator_cooldown,
            request_timeout,
            language_roles,
            level_role_a,
            level_role_b,
            keep_alive_port,
        })
    }
}

fn parse_var<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(optional_var(var)?.unwrap_or(default))
}

fn optional_var<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::Invalid {
                    var,
                    reason: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}

/// Parses `en=123,id=456` into a role table. A language may appear more than once.
pub fn parse_language_roles(raw: &str) -> Result<RoleLanguageTable, ConfigError> {
    let mut table = RoleLanguageTable::default();

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (code, role) = pair.split_once('=').ok_or_else(|| ConfigError::Invalid {
            var: "LANGUAGE_ROLES",
            reason: format!("expected `code=roleId`, got `{}`", pair),
        })?;

        let language = Language::from_code(code.trim()).ok_or_else(|| ConfigError::Invalid {
            var: "LANGUAGE_ROLES",
            reason: format!("unsupported language code `{}`", code.trim()),
        })?;
        let role_id: u64 = role.trim().parse().map_err(|_| ConfigError::Invalid {
            var: "LANGUAGE_ROLES",
            reason: format!("role id `{}` is not a number", role.trim()),
        })?;

        table.insert(role_id, language);
    }

    Ok(table)
}
