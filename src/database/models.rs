use super::schema::*;
use chrono::{DateTime, Utc};

#[derive(Debug, Queryable)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[table_name = "users"]
pub struct NewUserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Queryable)]
pub struct SubscriptionRow {
    pub id: i32,
    pub user_id: String,
    pub kind: String,
    pub enabled: bool,
    pub enable_sound: bool,
    pub enable_browser: bool,
    pub enable_email: bool,
    pub delivery_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[table_name = "subscriptions"]
pub struct NewSubscriptionRow {
    pub user_id: String,
    pub kind: String,
    pub enabled: bool,
    pub enable_sound: bool,
    pub enable_browser: bool,
    pub enable_email: bool,
    pub delivery_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Queryable)]
pub struct NotificationRow {
    pub id: i32,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[table_name = "notifications"]
pub struct NewNotificationRow {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub status: String,
}
