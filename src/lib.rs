//! Arbiter - trading decision coordinator
//!
//! Serializes competing trade intents into one authoritative decision per
//! (user, strategy, symbol) and executes the winner exactly once.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
