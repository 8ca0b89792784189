pub mod classifier;
pub mod commands;
pub mod config;
pub mod cooldown;
pub mod discord;
pub mod error;
pub mod groq;
pub mod keep_alive;
pub mod language;
pub mod leveling;
pub mod memory;
pub mod message;
pub mod models;
pub mod orchestrator;
pub mod persona;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;
