use crate::leveling::{Track, XpGrant};

pub const PREFIX: &str = "!";

pub const TRACK_USAGE: &str = "❌ Role must be either 'a' or 'b'.";
pub const ADD_XP_USAGE: &str = "❌ Usage: `!addxp <@member> <amount> <a|b>`";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `!ingat <fact>`
    Remember(String),
    /// `!daftar_ingatan`
    ListFacts,
    /// `!lupa <number|semua>`
    Forget(String),
    /// `!setup_persona`
    SetupPersona,
    /// `!level`
    Level,
    /// `!leaderboard [a|b]`, track A by default.
    Leaderboard(Track),
    /// `!addxp <@member> <amount> <a|b>`
    AddXp(XpGrant),
    /// A known command with unusable arguments. Carries the reply.
    Malformed(&'static str),
}

pub fn parse(content: &str) -> Option<Command> {
    let body = content.trim().strip_prefix(PREFIX)?;
    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "ingat" => Some(Command::Remember(rest.to_string())),
        "daftar_ingatan" => Some(Command::ListFacts),
        "lupa" => Some(Command::Forget(rest.to_string())),
        "setup_persona" => Some(Command::SetupPersona),
        "level" => Some(Command::Level),
        "leaderboard" => Some(match rest {
            "" => Command::Leaderboard(Track::A),
            name => Track::from_name(name)
                .map_or(Command::Malformed(TRACK_USAGE), Command::Leaderboard),
        }),
        "addxp" => Some(parse_grant(rest)),
        _ => None,
    }
}

fn parse_grant(args: &str) -> Command {
    let args: Vec<&str> = args.split_whitespace().collect();
    let [member, amount, track] = args.as_slice() else {
        return Command::Malformed(ADD_XP_USAGE);
    };
    let (Some(user_id), Ok(amount)) = (user_ref(member), amount.parse::<u64>()) else {
        return Command::Malformed(ADD_XP_USAGE);
    };
    match Track::from_name(track) {
        Some(track) => Command::AddXp(XpGrant {
            user_id,
            amount,
            track,
        }),
        None => Command::Malformed(TRACK_USAGE),
    }
}

/// A user mention (`<@id>`, `<@!id>`) or a bare id.
fn user_ref(text: &str) -> Option<u64> {
    let id = match text.strip_prefix("<@").and_then(|t| t.strip_suffix('>')) {
        Some(inner) => inner.strip_prefix('!').unwrap_or(inner),
        None => text,
    };
    id.parse().ok()
}
