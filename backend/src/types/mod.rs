pub mod id;

pub use id::{ChannelId, GuildId, SessionId, UserId};
