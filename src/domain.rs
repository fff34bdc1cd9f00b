use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub i32);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryToken(pub String);

/// The kind of monitoring event a trigger reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SiteUp,
    SiteDown,
    SlowResponse,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SiteUp => "site_up",
            Self::SiteDown => "site_down",
            Self::SlowResponse => "slow_response",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "site_up" => Some(Self::SiteUp),
            "site_down" => Some(Self::SiteDown),
            "slow_response" => Some(Self::SlowResponse),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Read => "read",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unread" => Some(Self::Unread),
            "read" => Some(Self::Read),
            _ => None,
        }
    }
}

/// Subscription categories. Site monitoring is the only one the service
/// offers today, but the storage schema and routes are keyed on it so a
/// second category is an enum variant away.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    SiteMonitoring,
}

impl SubscriptionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SiteMonitoring => "site_monitoring",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "site_monitoring" => Some(Self::SiteMonitoring),
            _ => None,
        }
    }
}

impl FromStr for SubscriptionKind {
    type Err = UnknownSubscriptionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(UnknownSubscriptionKind {})
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("Unknown subscription kind"))]
pub struct UnknownSubscriptionKind {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Per-channel delivery preferences. Wire names match the original API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPrefs {
    #[serde(rename = "enableSound", default = "default_true")]
    pub sound: bool,
    #[serde(rename = "enableBrowser", default = "default_true")]
    pub browser: bool,
    #[serde(rename = "enableEmail", default)]
    pub email: bool,
}

impl Default for ChannelPrefs {
    fn default() -> Self {
        Self {
            sound: true,
            browser: true,
            email: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: SubscriptionKind,
    pub enabled: bool,
    #[serde(flatten)]
    pub channels: ChannelPrefs,
    pub token: Option<DeliveryToken>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The full preference set a subscription upsert carries. Always the whole
/// set, never a partial patch; an absent token clears the stored one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
    #[serde(rename = "type")]
    pub kind: SubscriptionKind,
    pub enabled: bool,
    #[serde(flatten)]
    pub channels: ChannelPrefs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<DeliveryToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub event: EventType,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub event: EventType,
}

/// An externally-posted monitoring event, before fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    #[serde(rename = "type")]
    pub event: EventType,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerReceipt {
    pub subscriber_count: usize,
    pub notifications_created: usize,
}
