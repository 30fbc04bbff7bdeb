//! Route modules, one per resource family

pub mod auth;
pub mod bulk;
pub mod guilds;
pub mod health;
pub mod players;
pub mod stats;
pub mod wars;
