use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PrivacyStatus;

/// Lifecycle status reported by the broadcast platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    Created,
    Ready,
    Testing,
    Live,
    Complete,
    Revoked,
}

/// Transition that can be requested on a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastTransition {
    Testing,
    Live,
    Complete,
}

impl BroadcastTransition {
    pub fn target_status(self) -> BroadcastStatus {
        match self {
            Self::Testing => BroadcastStatus::Testing,
            Self::Live => BroadcastStatus::Live,
            Self::Complete => BroadcastStatus::Complete,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Testing => "testing",
            Self::Live => "live",
            Self::Complete => "complete",
        }
    }
}

/// Health of an ingest stream bound to a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Created,
    Ready,
    Active,
    Inactive,
    Error,
}

/// Request to create a broadcast for a schedule row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub description: String,
    pub scheduled_start_time: DateTime<Utc>,
    pub privacy: PrivacyStatus,
    pub stream_id: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// In-place update applied during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastUpdate {
    pub title: String,
    pub description: String,
    pub scheduled_start_time: DateTime<Utc>,
    pub privacy: PrivacyStatus,
}

/// Broadcast as known to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub broadcast_id: String,
    pub title: String,
    pub description: String,
    pub scheduled_start_time: DateTime<Utc>,
    pub privacy: PrivacyStatus,
    pub status: BroadcastStatus,
    pub stream_id: String,
}

impl Broadcast {
    /// Returns true when title, description, start time or privacy differ
    /// from `update`.
    pub fn differs_from(&self, update: &BroadcastUpdate) -> bool {
        self.title != update.title
            || self.description != update.description
            || self.scheduled_start_time != update.scheduled_start_time
            || self.privacy != update.privacy
    }
}
