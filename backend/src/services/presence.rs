//! Presence events and the gateway seam.
//!
//! The platform client lives in a sidecar process; it pushes raw voice
//! presence-change events and full per-guild snapshots over HTTP. The
//! in-memory [`GatewayState`] mirrors what that sidecar reports, and the
//! tracker reads live presence exclusively through the [`PresenceGateway`]
//! trait so reconciliation can be tested against fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::{ChannelId, GuildId, UserId};

/// One voice presence change for a user, as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub user_id: UserId,
    pub username: String,
    /// Absent guild context makes the event a defensive no-op.
    pub guild_id: Option<GuildId>,
    pub old_channel_id: Option<ChannelId>,
    pub new_channel_id: Option<ChannelId>,
    /// Display name of the new channel, when the user entered one.
    pub new_channel_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

/// The shape of a presence transition, computed once so handling is an
/// exhaustive match instead of nested conditionals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceTransition {
    Join(ChannelId),
    Leave(ChannelId),
    Switch { from: ChannelId, to: ChannelId },
    /// Same channel on both sides (mute/deafen updates and the like).
    Unchanged,
}

impl VoiceTransition {
    pub fn classify(old: Option<&ChannelId>, new: Option<&ChannelId>) -> Self {
        match (old, new) {
            (None, Some(to)) => VoiceTransition::Join(to.clone()),
            (Some(from), None) => VoiceTransition::Leave(from.clone()),
            (Some(from), Some(to)) if from != to => VoiceTransition::Switch {
                from: from.clone(),
                to: to.clone(),
            },
            _ => VoiceTransition::Unchanged,
        }
    }
}

/// A member currently present in a voice channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceMember {
    pub user_id: UserId,
    pub username: String,
    pub channel_id: ChannelId,
    pub channel_name: String,
    #[serde(default)]
    pub is_bot: bool,
}

/// Read access to live voice presence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceGateway: Send + Sync {
    /// Whether the gateway currently serves this guild at all.
    async fn guild_known(&self, guild_id: &GuildId) -> bool;

    /// Guilds the gateway currently serves.
    async fn guild_ids(&self) -> Vec<GuildId>;

    /// The member's current voice channel, or `None` when they are not in
    /// voice (or cannot be determined).
    async fn member_channel(&self, guild_id: &GuildId, user_id: &UserId) -> Option<VoiceMember>;

    /// All non-bot members currently in voice channels of the guild.
    async fn voice_members(&self, guild_id: &GuildId) -> Vec<VoiceMember>;

    /// Resolves a channel ID to its display name.
    async fn channel_name(&self, guild_id: &GuildId, channel_id: &ChannelId) -> Option<String>;
}

#[derive(Debug, Default)]
struct GuildPresence {
    members: HashMap<UserId, VoiceMember>,
    channel_names: HashMap<ChannelId, String>,
}

/// In-memory presence mirror fed by the gateway ingest handlers.
#[derive(Debug, Default)]
pub struct GatewayState {
    guilds: RwLock<HashMap<GuildId, GuildPresence>>,
}

impl GatewayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the full voice state of a guild. Also marks the guild as
    /// known even when no one is in voice.
    pub async fn apply_snapshot(&self, guild_id: &GuildId, members: Vec<VoiceMember>) {
        let mut guilds = self.guilds.write().await;
        let presence = guilds.entry(guild_id.clone()).or_default();
        presence.members.clear();
        for member in members {
            presence
                .channel_names
                .insert(member.channel_id.clone(), member.channel_name.clone());
            presence.members.insert(member.user_id.clone(), member);
        }
    }

    /// Folds a single presence event into the mirror.
    pub async fn apply_event(&self, event: &PresenceEvent) {
        let Some(guild_id) = &event.guild_id else {
            return;
        };
        let mut guilds = self.guilds.write().await;
        let presence = guilds.entry(guild_id.clone()).or_default();

        match &event.new_channel_id {
            Some(channel_id) => {
                let channel_name = event
                    .new_channel_name
                    .clone()
                    .or_else(|| presence.channel_names.get(channel_id).cloned())
                    .unwrap_or_else(|| "Unknown".to_string());
                presence
                    .channel_names
                    .insert(channel_id.clone(), channel_name.clone());
                presence.members.insert(
                    event.user_id.clone(),
                    VoiceMember {
                        user_id: event.user_id.clone(),
                        username: event.username.clone(),
                        channel_id: channel_id.clone(),
                        channel_name,
                        is_bot: event.is_bot,
                    },
                );
            }
            None => {
                presence.members.remove(&event.user_id);
            }
        }
    }

    /// Drops a guild from the mirror (the sidecar left it).
    pub async fn remove_guild(&self, guild_id: &GuildId) {
        self.guilds.write().await.remove(guild_id);
    }
}

#[async_trait]
impl PresenceGateway for GatewayState {
    async fn guild_known(&self, guild_id: &GuildId) -> bool {
        self.guilds.read().await.contains_key(guild_id)
    }

    async fn guild_ids(&self) -> Vec<GuildId> {
        self.guilds.read().await.keys().cloned().collect()
    }

    async fn member_channel(&self, guild_id: &GuildId, user_id: &UserId) -> Option<VoiceMember> {
        self.guilds
            .read()
            .await
            .get(guild_id)
            .and_then(|presence| presence.members.get(user_id).cloned())
    }

    async fn voice_members(&self, guild_id: &GuildId) -> Vec<VoiceMember> {
        self.guilds
            .read()
            .await
            .get(guild_id)
            .map(|presence| {
                presence
                    .members
                    .values()
                    .filter(|member| !member.is_bot)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn channel_name(&self, guild_id: &GuildId, channel_id: &ChannelId) -> Option<String> {
        self.guilds
            .read()
            .await
            .get(guild_id)
            .and_then(|presence| presence.channel_names.get(channel_id).cloned())
    }
}
