//! Data models shared across database access and API handlers.

pub mod adjustment;
pub mod guild_config;
pub mod session;
pub mod staff_member;
