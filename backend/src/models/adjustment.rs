//! Manual minute adjustments applied on top of tracked session time.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::{GuildId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Add,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Adjustment {
    pub id: Uuid,
    pub user_id: UserId,
    pub username: String,
    pub guild_id: GuildId,
    pub date: NaiveDate,
    /// Magnitude in minutes; the sign comes from `kind`.
    pub minutes: i64,
    pub kind: AdjustmentKind,
    pub reason: String,
    pub adjusted_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Adjustment {
    /// The signed contribution of this adjustment to a total.
    pub fn signed_minutes(&self) -> i64 {
        match self.kind {
            AdjustmentKind::Add => self.minutes,
            AdjustmentKind::Remove => -self.minutes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAdjustmentRequest {
    pub username: String,
    pub date: NaiveDate,
    pub minutes: i64,
    pub kind: AdjustmentKind,
    pub reason: String,
    pub adjusted_by: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serde_snake_case() {
        let k: AdjustmentKind = serde_json::from_str("\"remove\"").unwrap();
        assert_eq!(k, AdjustmentKind::Remove);
        assert_eq!(
            serde_json::to_value(AdjustmentKind::Add).unwrap(),
            serde_json::json!("add")
        );
    }

    #[test]
    fn signed_minutes_follow_kind() {
        let mut adj = Adjustment {
            id: Uuid::new_v4(),
            user_id: UserId::from("u1"),
            username: "alice".to_string(),
            guild_id: GuildId::from("g1"),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            minutes: 30,
            kind: AdjustmentKind::Add,
            reason: "manual report".to_string(),
            adjusted_by: UserId::from("mod1"),
            created_at: Utc::now(),
        };
        assert_eq!(adj.signed_minutes(), 30);
        adj.kind = AdjustmentKind::Remove;
        assert_eq!(adj.signed_minutes(), -30);
    }
}
