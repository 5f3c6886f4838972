#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use voicetrack_backend::error::StoreError;
use voicetrack_backend::models::session::Session;
use voicetrack_backend::repositories::guild_config::GuildConfigProvider;
use voicetrack_backend::repositories::session_store::SessionStore;
use voicetrack_backend::services::presence::{GatewayState, PresenceEvent, VoiceMember};
use voicetrack_backend::services::voice_tracker::VoiceTracker;
use voicetrack_backend::types::{ChannelId, GuildId, SessionId, UserId};
use voicetrack_backend::utils::time::Clock;

/// In-memory session store with switchable failure injection.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
    fail_inserts: AtomicBool,
    fail_closes: AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::SeqCst);
    }

    pub fn session(&self, id: SessionId) -> Option<Session> {
        self.sessions.lock().unwrap().get(&id).cloned()
    }

    /// All sessions for the user in the guild, ordered by join time.
    pub fn sessions_for(&self, user_id: &UserId, guild_id: &GuildId) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| &s.user_id == user_id && &s.guild_id == guild_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.join_time);
        sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn seed(&self, session: Session) {
        self.sessions.lock().unwrap().insert(session.id, session);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("insert disabled".to_string()));
        }
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.lock().unwrap().get(&id).cloned())
    }

    async fn find_active_for_user(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_active && &s.user_id == user_id && &s.guild_id == guild_id)
            .max_by_key(|s| s.join_time)
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn list_active_by_guild(&self, guild_id: &GuildId) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_active && &s.guild_id == guild_id)
            .cloned()
            .collect())
    }

    async fn list_for_user_on_date(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
        date: NaiveDate,
    ) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| &s.user_id == user_id && &s.guild_id == guild_id && s.date == date)
            .cloned()
            .collect())
    }

    async fn close(
        &self,
        id: SessionId,
        leave_time: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<bool, StoreError> {
        if self.fail_closes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("close disabled".to_string()));
        }
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(&id) {
            Some(session) if session.is_active => {
                session.is_active = false;
                session.leave_time = Some(leave_time);
                session.duration_minutes = duration_minutes;
                session.updated_at = leave_time;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Clock the tests move by hand.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(start: &str) -> Self {
        Self {
            now: Mutex::new(start.parse().expect("valid RFC 3339 instant")),
        }
    }

    pub fn set(&self, instant: &str) {
        *self.now.lock().unwrap() = instant.parse().expect("valid RFC 3339 instant");
    }

    pub fn advance_minutes(&self, minutes: i64) {
        *self.now.lock().unwrap() += Duration::minutes(minutes);
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Fixed guild settings, no database.
pub struct FakeConfigs {
    pub timezone: Tz,
    pub afk_channel: Option<ChannelId>,
}

impl FakeConfigs {
    pub fn with_timezone(timezone: Tz) -> Self {
        Self {
            timezone,
            afk_channel: None,
        }
    }
}

#[async_trait]
impl GuildConfigProvider for FakeConfigs {
    async fn guild_timezone(&self, _guild_id: &GuildId) -> Tz {
        self.timezone
    }

    async fn afk_channel(&self, _guild_id: &GuildId) -> Option<ChannelId> {
        self.afk_channel.clone()
    }
}

/// Tracker wired to in-memory collaborators.
pub struct Harness {
    pub store: Arc<MemorySessionStore>,
    pub gateway: Arc<GatewayState>,
    pub clock: Arc<ManualClock>,
    pub tracker: VoiceTracker,
}

impl Harness {
    pub fn new(timezone: Tz, start: &str) -> Self {
        Self::with_configs(FakeConfigs::with_timezone(timezone), start)
    }

    pub fn with_configs(configs: FakeConfigs, start: &str) -> Self {
        let store = Arc::new(MemorySessionStore::new());
        let gateway = Arc::new(GatewayState::new());
        let clock = Arc::new(ManualClock::at(start));
        let tracker = VoiceTracker::new(
            store.clone(),
            gateway.clone(),
            Arc::new(configs),
            clock.clone(),
        );
        Self {
            store,
            gateway,
            clock,
            tracker,
        }
    }

    /// Mirrors the event into the gateway then hands it to the tracker, the
    /// same order the ingest handler and consumer use.
    pub async fn deliver(&self, event: PresenceEvent) {
        self.gateway.apply_event(&event).await;
        self.tracker.handle_presence_change(&event).await;
    }
}

pub fn join_event(user: &str, guild: &str, channel: &str) -> PresenceEvent {
    PresenceEvent {
        user_id: UserId::from(user),
        username: user.to_string(),
        guild_id: Some(GuildId::from(guild)),
        old_channel_id: None,
        new_channel_id: Some(ChannelId::from(channel)),
        new_channel_name: Some(format!("name-{channel}")),
        is_bot: false,
    }
}

pub fn leave_event(user: &str, guild: &str, channel: &str) -> PresenceEvent {
    PresenceEvent {
        user_id: UserId::from(user),
        username: user.to_string(),
        guild_id: Some(GuildId::from(guild)),
        old_channel_id: Some(ChannelId::from(channel)),
        new_channel_id: None,
        new_channel_name: None,
        is_bot: false,
    }
}

pub fn switch_event(user: &str, guild: &str, from: &str, to: &str) -> PresenceEvent {
    PresenceEvent {
        user_id: UserId::from(user),
        username: user.to_string(),
        guild_id: Some(GuildId::from(guild)),
        old_channel_id: Some(ChannelId::from(from)),
        new_channel_id: Some(ChannelId::from(to)),
        new_channel_name: Some(format!("name-{to}")),
        is_bot: false,
    }
}

pub fn voice_member(user: &str, channel: &str) -> VoiceMember {
    VoiceMember {
        user_id: UserId::from(user),
        username: user.to_string(),
        channel_id: ChannelId::from(channel),
        channel_name: format!("name-{channel}"),
        is_bot: false,
    }
}

pub fn open_session(user: &str, guild: &str, channel: &str, join: &str, date: &str) -> Session {
    Session::open(
        UserId::from(user),
        user.to_string(),
        GuildId::from(guild),
        ChannelId::from(channel),
        format!("name-{channel}"),
        join.parse().expect("valid RFC 3339 instant"),
        date.parse().expect("valid ISO date"),
    )
}
