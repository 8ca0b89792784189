use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Cooling(DateTime<Utc>),
    /// Admitted and not yet settled. Keeps the timestamp to restore if the request fails.
    InFlight { previous: Option<DateTime<Utc>> },
}

pub enum Admission {
    Allowed(CooldownPermit),
    Rejected { remaining_secs: u64 },
    /// Another request from the same user holds the gate right now.
    InFlight,
}

/// Per-user cooldown gate.
///
/// Checking and reserving happen under one map entry lock, so two racing
/// requests from the same user can never both be admitted. The returned
/// [`CooldownPermit`] either records the completion time or, when dropped
/// unrecorded, hands the slot back as it was.
#[derive(Clone)]
pub struct CooldownGate {
    slots: Arc<DashMap<u64, Slot>>,
    cooldown: Duration,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn check(&self, user_id: u64, now: DateTime<Utc>) -> Admission {
        let cooldown_seconds = self.cooldown.as_secs() as i64;

        let rejected = match self.slots.entry(user_id) {
            Entry::Vacant(entry) => {
                entry.insert(Slot::InFlight { previous: None });
                None
            }
            Entry::Occupied(mut entry) => {
                let slot = *entry.get();
                match slot {
                    Slot::InFlight { .. } => return Admission::InFlight,
                    Slot::Cooling(last) => {
                        let elapsed = (now - last).num_seconds().max(0);
                        if elapsed < cooldown_seconds {
                            Some((cooldown_seconds - elapsed) as u64)
                        } else {
                            entry.insert(Slot::InFlight {
                                previous: Some(last),
                            });
                            None
                        }
                    }
                }
            }
        };

        match rejected {
            Some(remaining_secs) => Admission::Rejected { remaining_secs },
            None => Admission::Allowed(CooldownPermit {
                slots: Arc::clone(&self.slots),
                user_id,
                settled: false,
            }),
        }
    }

    /// Starts a fresh window for `user_id` at `now`.
    pub fn record(&self, user_id: u64, now: DateTime<Utc>) {
        self.slots.insert(user_id, Slot::Cooling(now));
    }

    /// Seconds left before `user_id` may pass again, if any.
    pub fn remaining(&self, user_id: u64, now: DateTime<Utc>) -> Option<u64> {
        let cooldown_seconds = self.cooldown.as_secs() as i64;
        match self.slots.get(&user_id).map(|slot| *slot) {
            Some(Slot::Cooling(last)) => {
                let elapsed = (now - last).num_seconds().max(0);
                (elapsed < cooldown_seconds).then(|| (cooldown_seconds - elapsed) as u64)
            }
            _ => None,
        }
    }
}

pub struct CooldownPermit {
    slots: Arc<DashMap<u64, Slot>>,
    user_id: u64,
    settled: bool,
}

impl CooldownPermit {
    pub fn record(mut self, now: DateTime<Utc>) {
        self.slots.insert(self.user_id, Slot::Cooling(now));
        self.settled = true;
    }
}

impl Drop for CooldownPermit {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let previous = match self.slots.get(&self.user_id).map(|slot| *slot) {
            Some(Slot::InFlight { previous }) => previous,
            _ => return,
        };

        match previous {
            Some(last) => {
                self.slots.insert(self.user_id, Slot::Cooling(last));
            }
            None => {
                self.slots.remove(&self.user_id);
            }
        }
    }
}
