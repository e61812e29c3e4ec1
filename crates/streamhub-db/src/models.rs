//! Database row types. These map directly to SQLite rows and are converted
//! into streamhub-types API models at the edge.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use streamhub_types::models::{ChannelProfile, User};

use crate::password;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    /// Argon2 PHC string.
    pub password: String,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn is_password_correct(&self, candidate: &str) -> bool {
        password::verify_password(candidate, &self.password)
    }

    /// Strip the password hash and refresh token.
    pub fn into_user(self) -> Result<User> {
        let id: Uuid = self
            .id
            .parse()
            .with_context(|| format!("Corrupt user id in database: {}", self.id))?;

        Ok(User {
            id,
            username: self.username,
            email: self.email,
            full_name: self.full_name,
            avatar: self.avatar,
            cover_image: self.cover_image,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Input for `Database::create_user`. `password` is plaintext; the store
/// hashes it before it touches disk.
pub struct NewUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar: String,
    pub cover_image: Option<String>,
}

pub struct ChannelProfileRow {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub subscribers_count: i64,
    pub channel_subscribed_to_count: i64,
    pub is_subscribed: bool,
}

impl From<ChannelProfileRow> for ChannelProfile {
    fn from(row: ChannelProfileRow) -> Self {
        Self {
            full_name: row.full_name,
            username: row.username,
            subscribers_count: row.subscribers_count.max(0) as u64,
            channel_subscribed_to_count: row.channel_subscribed_to_count.max(0) as u64,
            is_subscribed: row.is_subscribed,
            avatar: row.avatar,
            cover_image: row.cover_image,
            email: row.email,
        }
    }
}
