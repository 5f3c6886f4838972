pub mod adjustment;
pub mod guild_config;
pub mod session;
pub mod session_store;
pub mod staff_member;
