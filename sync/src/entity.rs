use serde::{Deserialize, Serialize};

/// A watched backend table. Closed set: the reconciler subscribes to exactly
/// these five entities and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// The logged-in user's profile row (points balance, display name).
    UserProfile,
    /// The logged-in user's daily check-in rows.
    CheckIn,
    /// Campus events (shared across all users).
    Event,
    /// Rewards-store products (shared across all users).
    Product,
    /// The logged-in user's check-in streak row.
    Streak,
}

/// A UI concern to re-fetch and re-render after a quiet period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshConcern {
    /// Profile, points, check-ins, streak — everything user-scoped.
    User,
    /// The campus events list.
    Events,
}

impl EntityKind {
    /// Maps a changed entity to the refresh concern it invalidates.
    ///
    /// `Product` maps to nothing: the rewards store has no wired refresh
    /// action, so a product change resets the debounce timer but flushes to a
    /// no-op when it is the last classification standing.
    pub fn concern(self) -> Option<RefreshConcern> {
        match self {
            EntityKind::UserProfile | EntityKind::CheckIn | EntityKind::Streak => {
                Some(RefreshConcern::User)
            }
            EntityKind::Event => Some(RefreshConcern::Events),
            EntityKind::Product => None,
        }
    }

    /// True when change notifications for this entity are filtered to the
    /// current user; false for campus-wide tables.
    pub fn is_user_scoped(self) -> bool {
        matches!(
            self,
            EntityKind::UserProfile | EntityKind::CheckIn | EntityKind::Streak
        )
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::UserProfile => "user_profile",
            EntityKind::CheckIn => "check_in",
            EntityKind::Event => "event",
            EntityKind::Product => "product",
            EntityKind::Streak => "streak",
        };
        f.write_str(name)
    }
}

impl std::fmt::Display for RefreshConcern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshConcern::User => f.write_str("user"),
            RefreshConcern::Events => f.write_str("events"),
        }
    }
}

/// One row-level mutation reported by the backend. Consumed and discarded by
/// classification; the payload is never inspected by the reconciler itself.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub entity: EntityKind,
    pub payload: serde_json::Value,
}
