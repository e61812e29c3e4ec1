use crate::Database;
use crate::models::{ChannelProfileRow, NewUser, UserRow};
use crate::password;
use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

const USER_COLUMNS: &str = "id, username, email, full_name, avatar, cover_image, password, \
                            refresh_token, created_at, updated_at";

impl Database {
    // -- Users --

    /// Insert a user. The username is stored lowercased and the password is
    /// hashed before the row is written.
    pub fn create_user(&self, new: &NewUser) -> Result<()> {
        let password_hash = password::hash_password(&new.password)?;
        let username = new.username.trim().to_lowercase();
        let now = Utc::now();

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, full_name, avatar, cover_image, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    new.id,
                    username,
                    new.email.trim(),
                    new.full_name.trim(),
                    new.avatar,
                    new.cover_image,
                    password_hash,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Users matching the (lowercased) username or the email. A username
    /// match sorts first.
    pub fn find_users_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Vec<UserRow>> {
        let username = username.map(|u| u.trim().to_lowercase());
        let email = email.map(|e| e.trim().to_string());

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE (?1 IS NOT NULL AND username = ?1) OR (?2 IS NOT NULL AND email = ?2)
                 ORDER BY CASE WHEN username = ?1 THEN 0 ELSE 1 END, created_at"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![username, email], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Overwrite (or clear, with `None`) the single stored refresh token.
    pub fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?1 WHERE id = ?2",
                params![token, id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Replace the stored refresh token only if it still equals `expected`.
    /// Two concurrent refreshes with the same token cannot both win.
    pub fn rotate_refresh_token(&self, id: &str, expected: &str, next: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?1 WHERE id = ?2 AND refresh_token = ?3",
                params![next, id, expected],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn update_password(&self, id: &str, new_password: &str) -> Result<bool> {
        let password_hash = password::hash_password(new_password)?;
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?1, updated_at = ?2 WHERE id = ?3",
                params![password_hash, Utc::now(), id],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn update_account_details(
        &self,
        id: &str,
        full_name: &str,
        email: &str,
    ) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET full_name = ?1, email = ?2, updated_at = ?3 WHERE id = ?4",
                params![full_name.trim(), email.trim(), Utc::now(), id],
            )?;
            query_user_by_id(conn, id)
        })
    }

    pub fn update_avatar(&self, id: &str, url: &str) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET avatar = ?1, updated_at = ?2 WHERE id = ?3",
                params![url, Utc::now(), id],
            )?;
            query_user_by_id(conn, id)
        })
    }

    pub fn update_cover_image(&self, id: &str, url: &str) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET cover_image = ?1, updated_at = ?2 WHERE id = ?3",
                params![url, Utc::now(), id],
            )?;
            query_user_by_id(conn, id)
        })
    }

    // -- Channels --

    /// Profile of the channel owned by `username`, with subscriber counts and
    /// whether `viewer_id` is one of its subscribers.
    pub fn get_channel_profile(
        &self,
        username: &str,
        viewer_id: Option<&str>,
    ) -> Result<Option<ChannelProfileRow>> {
        let username = username.trim().to_lowercase();
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT u.full_name, u.username, u.email, u.avatar, u.cover_image,
                            (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id),
                            (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber_id = u.id),
                            EXISTS (SELECT 1 FROM subscriptions s
                                    WHERE s.channel_id = u.id AND s.subscriber_id = ?2)
                     FROM users u
                     WHERE u.username = ?1",
                    params![username, viewer_id],
                    |row| {
                        Ok(ChannelProfileRow {
                            full_name: row.get(0)?,
                            username: row.get(1)?,
                            email: row.get(2)?,
                            avatar: row.get(3)?,
                            cover_image: row.get(4)?,
                            subscribers_count: row.get(5)?,
                            channel_subscribed_to_count: row.get(6)?,
                            is_subscribed: row.get(7)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Subscriptions --

    /// Toggle a subscription: removes it if present, inserts it if not.
    /// Returns true when the subscription now exists.
    pub fn toggle_subscription(&self, id: &str, subscriber_id: &str, channel_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM subscriptions WHERE subscriber_id = ?1 AND channel_id = ?2",
                    params![subscriber_id, channel_id],
                    |row| row.get(0),
                )
                .optional()?;

            let subscribed = if let Some(existing_id) = existing {
                tx.execute("DELETE FROM subscriptions WHERE id = ?1", [&existing_id])?;
                false
            } else {
                tx.execute(
                    "INSERT INTO subscriptions (id, subscriber_id, channel_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![id, subscriber_id, channel_id, Utc::now()],
                )?;
                true
            };

            tx.commit()?;
            Ok(subscribed)
        })
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        avatar: row.get(4)?,
        cover_image: row.get(5)?,
        password: row.get(6)?,
        refresh_token: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let row = conn.query_row(&sql, [id], map_user).optional()?;
    Ok(row)
}
