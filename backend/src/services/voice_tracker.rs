//! Voice session lifecycle tracking.
//!
//! Converts presence-change events into non-overlapping session records,
//! reconciles persisted state with live presence after a restart, and splits
//! sessions that straddle a guild-local day boundary.
//!
//! Invariant: each `(user, guild)` pair has at most one active session at
//! any instant. The store is the source of truth; the `active` map is an
//! O(1) dispatch cache owned by this instance and is only mutated after a
//! successful store write, so a failed write leaves both consistent.
//!
//! Live events are expected to arrive through a single consumer task (see
//! `spawn_event_consumer`), which serializes handling per process. Recovery
//! and the midnight split run on other tasks and serialize against event
//! handling by holding the index lock across each per-session
//! read-then-write.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::models::session::Session;
use crate::repositories::guild_config::GuildConfigProvider;
use crate::repositories::session_store::SessionStore;
use crate::services::presence::{PresenceEvent, PresenceGateway, VoiceTransition};
use crate::types::{ChannelId, GuildId, SessionId, UserId};
use crate::utils::time::{
    local_date_at, midnight_split_time, session_duration_minutes, Clock,
};

pub type SessionKey = (UserId, GuildId);

pub struct VoiceTracker {
    store: Arc<dyn SessionStore>,
    gateway: Arc<dyn PresenceGateway>,
    configs: Arc<dyn GuildConfigProvider>,
    clock: Arc<dyn Clock>,
    active: Mutex<HashMap<SessionKey, SessionId>>,
}

impl VoiceTracker {
    pub fn new(
        store: Arc<dyn SessionStore>,
        gateway: Arc<dyn PresenceGateway>,
        configs: Arc<dyn GuildConfigProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            configs,
            clock,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Number of sessions currently tracked in the in-memory index.
    pub async fn tracked_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Handles one presence-change event. Never fails: store errors are
    /// logged per event and the operation becomes a no-op.
    pub async fn handle_presence_change(&self, event: &PresenceEvent) {
        if event.is_bot {
            return;
        }
        let Some(guild_id) = event.guild_id.clone() else {
            tracing::debug!(user_id = %event.user_id, "presence event without guild context, dropping");
            return;
        };

        let transition = VoiceTransition::classify(
            event.old_channel_id.as_ref(),
            event.new_channel_id.as_ref(),
        );
        let now = self.clock.now_utc();

        match transition {
            VoiceTransition::Join(to) => {
                self.open_session(&event.user_id, &event.username, &guild_id, &to, now)
                    .await;
            }
            VoiceTransition::Leave(_) => {
                self.close_tracked_session(&event.user_id, &guild_id, now)
                    .await;
            }
            VoiceTransition::Switch { from: _, to } => {
                // Leave and join share one instant so no time is lost or
                // double-counted across the two records.
                self.close_tracked_session(&event.user_id, &guild_id, now)
                    .await;
                self.open_session(&event.user_id, &event.username, &guild_id, &to, now)
                    .await;
            }
            VoiceTransition::Unchanged => {}
        }
    }

    async fn open_session(
        &self,
        user_id: &UserId,
        username: &str,
        guild_id: &GuildId,
        channel_id: &ChannelId,
        now: DateTime<Utc>,
    ) {
        let key = (user_id.clone(), guild_id.clone());
        let mut active = self.active.lock().await;
        if active.contains_key(&key) {
            // Duplicate join signal; idempotent no-op.
            tracing::debug!(%user_id, %guild_id, "session already tracked, skipping join");
            return;
        }

        let tz = self.configs.guild_timezone(guild_id).await;
        let channel_name = self
            .gateway
            .channel_name(guild_id, channel_id)
            .await
            .unwrap_or_else(|| "Unknown".to_string());

        let mut session = Session::open(
            user_id.clone(),
            username.to_string(),
            guild_id.clone(),
            channel_id.clone(),
            channel_name,
            now,
            local_date_at(&tz, now),
        );
        session.is_afk = self.configs.afk_channel(guild_id).await.as_ref() == Some(channel_id);

        if let Err(err) = self.store.insert(&session).await {
            tracing::warn!(%user_id, %guild_id, error = %err, "failed to persist new session");
            return;
        }
        active.insert(key, session.id);
        tracing::info!(%user_id, %guild_id, channel = %session.channel_name, "session opened");
    }

    async fn close_tracked_session(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
        now: DateTime<Utc>,
    ) {
        let key = (user_id.clone(), guild_id.clone());
        let mut active = self.active.lock().await;
        let Some(session_id) = active.get(&key).copied() else {
            return;
        };

        let session = match self.store.find_by_id(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::warn!(%user_id, %guild_id, %session_id, "tracked session missing from store");
                active.remove(&key);
                return;
            }
            Err(err) => {
                tracing::warn!(%user_id, %guild_id, error = %err, "failed to load session for close");
                return;
            }
        };

        let duration = session_duration_minutes(session.join_time, now);
        match self.store.close(session_id, now, duration).await {
            Ok(true) => {
                active.remove(&key);
                tracing::info!(%user_id, %guild_id, duration_minutes = duration, "session closed");
            }
            Ok(false) => {
                // Already closed elsewhere; drop the stale index entry.
                active.remove(&key);
                tracing::debug!(%user_id, %guild_id, %session_id, "session was already closed");
            }
            Err(err) => {
                tracing::warn!(%user_id, %guild_id, error = %err, "failed to close session");
            }
        }
    }

    /// Startup pass 1: reconcile persisted active sessions against live
    /// presence. One broken guild or member must not abort the rest.
    pub async fn recover_active_sessions(&self) {
        tracing::info!("recovering active sessions");
        let now = self.clock.now_utc();

        let sessions = match self.store.list_active().await {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::error!(error = %err, "failed to list active sessions, skipping recovery");
                return;
            }
        };

        for session in sessions {
            self.recover_one(session, now).await;
        }
        let tracked = self.tracked_count().await;
        tracing::info!(tracked, "session recovery complete");
    }

    async fn recover_one(&self, session: Session, now: DateTime<Utc>) {
        let key = (session.user_id.clone(), session.guild_id.clone());
        let mut active = self.active.lock().await;

        if !self.gateway.guild_known(&session.guild_id).await {
            // Guild is gone; the session is abandoned.
            self.close_abandoned(&session, now).await;
            return;
        }

        match self
            .gateway
            .member_channel(&session.guild_id, &session.user_id)
            .await
        {
            None => {
                // Presence ended while we were offline; the real leave time
                // is unrecoverable, so best-effort close at restart time.
                self.close_abandoned(&session, now).await;
                tracing::info!(user_id = %session.user_id, "closed stale session");
            }
            Some(member) if member.channel_id != session.channel_id => {
                // Moved while we were offline. Close the stale record now
                // and start fresh in the observed channel; the true switch
                // instant is unknowable and is deliberately not guessed.
                if !self.close_abandoned(&session, now).await {
                    return;
                }
                let tz = self.configs.guild_timezone(&session.guild_id).await;
                let mut fresh = Session::open(
                    session.user_id.clone(),
                    session.username.clone(),
                    session.guild_id.clone(),
                    member.channel_id.clone(),
                    member.channel_name.clone(),
                    now,
                    local_date_at(&tz, now),
                );
                fresh.is_afk = self.configs.afk_channel(&session.guild_id).await.as_ref()
                    == Some(&member.channel_id);
                match self.store.insert(&fresh).await {
                    Ok(()) => {
                        active.insert(key, fresh.id);
                        tracing::info!(
                            user_id = %fresh.user_id,
                            channel = %fresh.channel_name,
                            "recovered session in new channel"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(user_id = %session.user_id, error = %err, "failed to open recovered session");
                    }
                }
            }
            Some(_) => {
                // Still where we left them; lossless continuity.
                active.insert(key, session.id);
                tracing::info!(user_id = %session.user_id, "restored active session");
            }
        }
    }

    /// Closes a session at `now` during recovery. Returns whether the row
    /// was actually closed.
    async fn close_abandoned(&self, session: &Session, now: DateTime<Utc>) -> bool {
        let duration = session_duration_minutes(session.join_time, now);
        match self.store.close(session.id, now, duration).await {
            Ok(closed) => closed,
            Err(err) => {
                tracing::warn!(
                    user_id = %session.user_id,
                    guild_id = %session.guild_id,
                    error = %err,
                    "failed to close abandoned session"
                );
                false
            }
        }
    }

    /// Startup pass 2: open sessions for members already in voice whose
    /// join event was never observed.
    pub async fn scan_current_voice_channels(&self) {
        tracing::info!("scanning current voice channels");

        for guild_id in self.gateway.guild_ids().await {
            let tz = self.configs.guild_timezone(&guild_id).await;
            let afk_channel = self.configs.afk_channel(&guild_id).await;
            let members = self.gateway.voice_members(&guild_id).await;
            tracing::debug!(%guild_id, members = members.len(), "scanning guild voice state");

            for member in members {
                let now = self.clock.now_utc();
                let key = (member.user_id.clone(), guild_id.clone());
                let mut active = self.active.lock().await;
                if active.contains_key(&key) {
                    continue;
                }

                match self
                    .store
                    .find_active_for_user(&member.user_id, &guild_id)
                    .await
                {
                    Ok(Some(existing)) => {
                        active.insert(key, existing.id);
                        tracing::debug!(user_id = %member.user_id, "found existing session during scan");
                        continue;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(user_id = %member.user_id, %guild_id, error = %err, "scan lookup failed");
                        continue;
                    }
                }

                let mut session = Session::open(
                    member.user_id.clone(),
                    member.username.clone(),
                    guild_id.clone(),
                    member.channel_id.clone(),
                    member.channel_name.clone(),
                    now,
                    local_date_at(&tz, now),
                );
                session.is_afk = afk_channel.as_ref() == Some(&member.channel_id);
                match self.store.insert(&session).await {
                    Ok(()) => {
                        active.insert(key, session.id);
                        tracing::info!(
                            user_id = %session.user_id,
                            channel = %session.channel_name,
                            "created session during scan"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(user_id = %member.user_id, %guild_id, error = %err, "failed to create scanned session");
                    }
                }
            }
        }
        let tracked = self.tracked_count().await;
        tracing::info!(tracked, "voice channel scan complete");
    }

    /// Closes every active session of the guild whose attributed date is no
    /// longer the guild-local today, at exact local midnight, and opens a
    /// continuation for the new day. Idempotent once dates match; the
    /// boundary instant stays exact no matter how late this runs.
    pub async fn split_midnight_sessions(&self, guild_id: &GuildId, tz: &Tz) {
        let today = local_date_at(tz, self.clock.now_utc());

        let sessions = match self.store.list_active_by_guild(guild_id).await {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::warn!(%guild_id, error = %err, "failed to list sessions for midnight split");
                return;
            }
        };

        for session in sessions {
            if session.date == today {
                continue;
            }

            let key = (session.user_id.clone(), session.guild_id.clone());
            let mut active = self.active.lock().await;

            let boundary = midnight_split_time(session.date, tz);
            let duration = session_duration_minutes(session.join_time, boundary);
            match self.store.close(session.id, boundary, duration).await {
                Ok(true) => {}
                Ok(false) => {
                    // A live leave beat us to it; nothing left to continue.
                    if active.get(&key) == Some(&session.id) {
                        active.remove(&key);
                    }
                    continue;
                }
                Err(err) => {
                    tracing::warn!(user_id = %session.user_id, %guild_id, error = %err, "failed to close session at day boundary");
                    continue;
                }
            }

            let mut continuation = Session::open(
                session.user_id.clone(),
                session.username.clone(),
                session.guild_id.clone(),
                session.channel_id.clone(),
                session.channel_name.clone(),
                boundary,
                today,
            );
            continuation.is_afk = session.is_afk;
            match self.store.insert(&continuation).await {
                Ok(()) => {
                    active.insert(key, continuation.id);
                    tracing::info!(
                        user_id = %continuation.user_id,
                        %guild_id,
                        date = %today,
                        "split session at day boundary"
                    );
                }
                Err(err) => {
                    // The old record is closed; without a continuation the
                    // index entry would point at a closed session.
                    if active.get(&key) == Some(&session.id) {
                        active.remove(&key);
                    }
                    tracing::warn!(user_id = %session.user_id, %guild_id, error = %err, "failed to open continuation session");
                }
            }
        }
    }

    /// Today's total minutes for a user: closed durations plus the live
    /// elapsed minutes of any open session, using the guild-local date.
    pub async fn get_user_today_minutes(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
    ) -> Result<i64, crate::error::StoreError> {
        let tz = self.configs.guild_timezone(guild_id).await;
        let now = self.clock.now_utc();
        let today = local_date_at(&tz, now);

        let sessions = self
            .store
            .list_for_user_on_date(user_id, guild_id, today)
            .await?;
        Ok(sessions.iter().map(|s| s.minutes_as_of(now)).sum())
    }
}

/// Funnels live presence events through one consumer so no two events for
/// the same key are ever mid-flight concurrently.
pub fn spawn_event_consumer(
    tracker: Arc<VoiceTracker>,
    mut events: mpsc::Receiver<PresenceEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracker.handle_presence_change(&event).await;
        }
        tracing::info!("presence event channel closed, consumer stopping");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::repositories::guild_config::MockGuildConfigProvider;
    use crate::repositories::session_store::MockSessionStore;
    use crate::services::presence::MockPresenceGateway;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now_utc(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn join_event(user: &str, guild: &str, channel: &str) -> PresenceEvent {
        PresenceEvent {
            user_id: UserId::from(user),
            username: user.to_string(),
            guild_id: Some(GuildId::from(guild)),
            old_channel_id: None,
            new_channel_id: Some(ChannelId::from(channel)),
            new_channel_name: Some("General".to_string()),
            is_bot: false,
        }
    }

    fn tracker_with(
        store: MockSessionStore,
        gateway: MockPresenceGateway,
        configs: MockGuildConfigProvider,
    ) -> VoiceTracker {
        VoiceTracker::new(
            Arc::new(store),
            Arc::new(gateway),
            Arc::new(configs),
            Arc::new(FixedClock("2024-06-01T10:00:00Z".parse().unwrap())),
        )
    }

    #[tokio::test]
    async fn store_failure_on_join_leaves_index_empty() {
        let mut store = MockSessionStore::new();
        store
            .expect_insert()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("down".to_string())));
        let mut gateway = MockPresenceGateway::new();
        gateway
            .expect_channel_name()
            .returning(|_, _| Some("General".to_string()));
        let mut configs = MockGuildConfigProvider::new();
        configs.expect_guild_timezone().returning(|_| chrono_tz::UTC);
        configs.expect_afk_channel().returning(|_| None);

        let tracker = tracker_with(store, gateway, configs);
        tracker.handle_presence_change(&join_event("u1", "g1", "c1")).await;
        assert_eq!(tracker.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn bot_events_touch_nothing() {
        // No mock expectations: any store or gateway call would panic.
        let store = MockSessionStore::new();
        let gateway = MockPresenceGateway::new();
        let configs = MockGuildConfigProvider::new();
        let tracker = tracker_with(store, gateway, configs);

        let mut event = join_event("b1", "g1", "c1");
        event.is_bot = true;
        tracker.handle_presence_change(&event).await;
        assert_eq!(tracker.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn event_without_guild_is_dropped() {
        let store = MockSessionStore::new();
        let gateway = MockPresenceGateway::new();
        let configs = MockGuildConfigProvider::new();
        let tracker = tracker_with(store, gateway, configs);

        let mut event = join_event("u1", "g1", "c1");
        event.guild_id = None;
        tracker.handle_presence_change(&event).await;
        assert_eq!(tracker.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn recovery_aborts_cleanly_when_listing_fails() {
        let mut store = MockSessionStore::new();
        store
            .expect_list_active()
            .times(1)
            .returning(|| Err(StoreError::Unavailable("down".to_string())));
        let gateway = MockPresenceGateway::new();
        let configs = MockGuildConfigProvider::new();

        let tracker = tracker_with(store, gateway, configs);
        tracker.recover_active_sessions().await;
        assert_eq!(tracker.tracked_count().await, 0);
    }
}
