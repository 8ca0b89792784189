use crate::cooldown::{Admission, Clock, CooldownGate};
use crate::error::StoreError;
use crate::memory::FactStore;
use crate::message::{Author, Reply, Tone};
use crate::orchestrator::MEMORY_OFFLINE;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub const XP_PER_MESSAGE: u64 = 15;
pub const XP_COOLDOWN: Duration = Duration::from_secs(60);
pub const LEADERBOARD_SIZE: usize = 10;

const LEVEL_PREFIX: &str = "level_";

pub fn xp_for_next_level(level: u64) -> u64 {
    100 * (level + 1)
}

fn level_key(user_id: u64) -> String {
    format!("{}{}", LEVEL_PREFIX, user_id)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub xp: u64,
    pub level: u64,
}

impl Progress {
    /// Adds XP, carrying leftovers through as many levels as it covers.
    /// Returns whether the level went up.
    pub fn gain(&mut self, xp: u64) -> bool {
        let before = self.level;
        self.xp += xp;
        while self.xp >= xp_for_next_level(self.level) {
            self.xp -= xp_for_next_level(self.level);
            self.level += 1;
        }
        self.level > before
    }

    pub fn percent(&self) -> u64 {
        self.xp * 100 / xp_for_next_level(self.level)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRecord {
    #[serde(default)]
    pub role_a: Progress,
    #[serde(default)]
    pub role_b: Progress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    A,
    B,
}

impl Track {
    pub fn label(self) -> &'static str {
        match self {
            Track::A => "Role A",
            Track::B => "Role B",
        }
    }

    /// `a` or `b`, any case.
    pub fn from_name(name: &str) -> Option<Track> {
        match name.to_ascii_lowercase().as_str() {
            "a" => Some(Track::A),
            "b" => Some(Track::B),
            _ => None,
        }
    }

    fn of(self, record: &LevelRecord) -> Progress {
        match self {
            Track::A => record.role_a,
            Track::B => record.role_b,
        }
    }

    fn of_mut(self, record: &mut LevelRecord) -> &mut Progress {
        match self {
            Track::A => &mut record.role_a,
            Track::B => &mut record.role_b,
        }
    }
}

/// An administrator's manual XP award.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpGrant {
    pub user_id: u64,
    pub amount: u64,
    pub track: Track,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub user_id: u64,
    pub progress: Progress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUp {
    pub track: Track,
    pub level: u64,
}

impl LevelUp {
    pub fn congratulation(&self, user_id: u64) -> String {
        format!(
            "🎉 Congrats <@{}>, you reached Level {} for **{}**!",
            user_id,
            self.level,
            self.track.label()
        )
    }
}

pub struct Leveling {
    store: Arc<dyn FactStore>,
    cooldowns: CooldownGate,
    clock: Arc<dyn Clock>,
    role_a: Option<u64>,
    role_b: Option<u64>,
    timeout: Duration,
    /// Serialises every read-modify-write of a level record.
    writes: Mutex<()>,
}

impl Leveling {
    pub fn new(
        store: Arc<dyn FactStore>,
        clock: Arc<dyn Clock>,
        role_a: Option<u64>,
        role_b: Option<u64>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            cooldowns: CooldownGate::new(XP_COOLDOWN),
            clock,
            role_a,
            role_b,
            timeout,
            writes: Mutex::new(()),
        }
    }

    /// Awards XP for one message. Users without a tracked role, or still on
    /// cooldown, get nothing.
    pub async fn award(&self, user_id: u64, roles: &[u64]) -> Result<Vec<LevelUp>, StoreError> {
        let holds = |role: Option<u64>| role.is_some_and(|r| roles.contains(&r));
        let (on_a, on_b) = (holds(self.role_a), holds(self.role_b));
        if !on_a && !on_b {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let permit = match self.cooldowns.check(user_id, now) {
            Admission::Allowed(permit) => permit,
            _ => return Ok(Vec::new()),
        };

        let _writing = self.writes.lock().await;
        let mut record = self.load(user_id).await?;
        let mut level_ups = Vec::new();
        if on_a && record.role_a.gain(XP_PER_MESSAGE) {
            level_ups.push(LevelUp {
                track: Track::A,
                level: record.role_a.level,
            });
        }
        if on_b && record.role_b.gain(XP_PER_MESSAGE) {
            level_ups.push(LevelUp {
                track: Track::B,
                level: record.role_b.level,
            });
        }

        self.save(user_id, &record).await?;
        permit.record(now);

        for level_up in &level_ups {
            info!(user_id, track = level_up.track.label(), level = level_up.level, "level up");
        }
        Ok(level_ups)
    }

    pub async fn stats(&self, author: &Author) -> Reply {
        let record = match self.load(author.id).await {
            Ok(record) => record,
            Err(e) => {
                error!("level stats unavailable: {}", e);
                return Reply::text(MEMORY_OFFLINE);
            }
        };

        let block = |icon: &str, track: Track, progress: &Progress| {
            format!(
                "{} **{}**\n**Level:** {}\n**XP:** {}/{}\n**Progress:** {}%",
                icon,
                track.label(),
                progress.level,
                progress.xp,
                xp_for_next_level(progress.level),
                progress.percent()
            )
        };

        Reply::titled(
            format!("📊 {}'s Level Stats", author.display_name),
            format!(
                "{}\n\n{}",
                block("🔵", Track::A, &record.role_a),
                block("🟢", Track::B, &record.role_b)
            ),
            Tone::Info,
        )
        .with_footer(format!(
            "XP Cooldown: {} seconds | XP per message: {}",
            XP_COOLDOWN.as_secs(),
            XP_PER_MESSAGE
        ))
    }

    /// Top [`LEADERBOARD_SIZE`] users on `track` by level, then XP.
    /// `name_of` resolves a display name; unknown users are shown by id.
    pub async fn leaderboard<F>(&self, track: Track, requester: &Author, name_of: F) -> Reply
    where
        F: Fn(u64) -> Option<String>,
    {
        let standings = match self.standings(track).await {
            Ok(standings) => standings,
            Err(e) => {
                error!("leaderboard unavailable: {}", e);
                return Reply::text(MEMORY_OFFLINE);
            }
        };

        let body = if standings.is_empty() {
            "No users have earned XP yet!".to_string()
        } else {
            standings
                .iter()
                .enumerate()
                .map(|(i, standing)| {
                    let rank = match i {
                        0 => "🥇".to_string(),
                        1 => "🥈".to_string(),
                        2 => "🥉".to_string(),
                        _ => format!("`{}.`", i + 1),
                    };
                    let name = name_of(standing.user_id)
                        .unwrap_or_else(|| format!("User {}", standing.user_id));
                    format!(
                        "{} **{}** - Level {} ({} XP)",
                        rank, name, standing.progress.level, standing.progress.xp
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        Reply::titled(format!("🏆 Leaderboard - {}", track.label()), body, Tone::Ranking)
            .with_footer(format!("Requested by {}", requester.display_name))
    }

    /// Adds XP by hand, carrying over levels like ordinary chatter does.
    /// Administrators only. Ignores the chatter cooldown.
    pub async fn add_xp(&self, grant: XpGrant, is_admin: bool) -> Reply {
        if !is_admin {
            return Reply::text("❌ You need administrator permission to add XP.");
        }

        let _writing = self.writes.lock().await;
        let mut record = match self.load(grant.user_id).await {
            Ok(record) => record,
            Err(e) => {
                error!("cannot add XP: {}", e);
                return Reply::text(MEMORY_OFFLINE);
            }
        };

        let progress = grant.track.of_mut(&mut record);
        progress.gain(grant.amount);
        let progress = *progress;

        if let Err(e) = self.save(grant.user_id, &record).await {
            error!("cannot add XP: {}", e);
            return Reply::text(MEMORY_OFFLINE);
        }

        info!(
            user_id = grant.user_id,
            amount = grant.amount,
            track = grant.track.label(),
            "XP added by hand"
        );
        Reply::titled(
            "✅ XP Added",
            format!(
                "**User:** <@{}>\n**Role:** {}\n**XP Added:** +{}\n**New Total XP:** {}\n**Current Level:** {}",
                grant.user_id,
                grant.track.label(),
                grant.amount,
                progress.xp,
                progress.level
            ),
            Tone::Success,
        )
    }

    async fn standings(&self, track: Track) -> Result<Vec<Standing>, StoreError> {
        let keys = self.bounded(self.store.keys(LEVEL_PREFIX)).await?;

        let mut standings = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(user_id) = key
                .strip_prefix(LEVEL_PREFIX)
                .and_then(|id| id.parse::<u64>().ok())
            else {
                continue;
            };
            let Some(raw) = self.bounded(self.store.get(&key)).await? else {
                continue;
            };
            match serde_json::from_str::<LevelRecord>(&raw) {
                Ok(record) => standings.push(Standing {
                    user_id,
                    progress: track.of(&record),
                }),
                Err(e) => warn!(user_id, "skipping unreadable level record: {}", e),
            }
        }

        standings.sort_by(|a, b| {
            (b.progress.level, b.progress.xp, a.user_id).cmp(&(
                a.progress.level,
                a.progress.xp,
                b.user_id,
            ))
        });
        standings.truncate(LEADERBOARD_SIZE);
        Ok(standings)
    }

    async fn load(&self, user_id: u64) -> Result<LevelRecord, StoreError> {
        let key = level_key(user_id);
        match self.bounded(self.store.get(&key)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(user_id, "resetting unreadable level record: {}", e);
                LevelRecord::default()
            })),
            None => Ok(LevelRecord::default()),
        }
    }

    async fn save(&self, user_id: u64, record: &LevelRecord) -> Result<(), StoreError> {
        let key = level_key(user_id);
        let raw = serde_json::to_string(record)
            .map_err(|source| StoreError::Corrupt { key: key.clone(), source })?;
        self.bounded(self.store.set(&key, raw)).await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}
