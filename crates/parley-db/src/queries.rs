use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::Database;
use crate::StoreError;
use crate::models::{CounterpartMessageRow, MessageDetailRow, MessageRow, UserRow};

impl Database {
    // -- Users --

    /// Insert a new user with join and last-login timestamps both set to
    /// now. A duplicate username surfaces as `StoreError::Conflict`.
    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
        phone: &str,
    ) -> Result<UserRow, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password, first_name, last_name, phone, join_at, last_login_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![username, password_hash, first_name, last_name, phone, now],
            )
            .map_err(StoreError::classify)?;
            Ok(UserRow {
                username: username.to_string(),
                password: password_hash.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                phone: phone.to_string(),
                join_at: now.clone(),
                last_login_at: now.clone(),
            })
        })
    }

    pub fn get_user(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user(conn, username))
    }

    /// Stored hash only, for credential checks.
    pub fn get_user_password(&self, username: &str) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| {
            let hash = conn
                .query_row(
                    "SELECT password FROM users WHERE username = ?1",
                    [username],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(hash)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, password, first_name, last_name, phone, join_at, last_login_at
                 FROM users ORDER BY username",
            )?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Set last_login_at to now. Returns the number of affected rows so the
    /// caller can distinguish an unknown username.
    pub fn update_last_login(&self, username: &str) -> Result<usize, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE users SET last_login_at = ?1 WHERE username = ?2",
                rusqlite::params![now, username],
            )?;
            Ok(affected)
        })
    }

    // -- Messages --

    /// Insert a message with sent_at set to now and read_at absent. An
    /// unknown sender or recipient surfaces as `StoreError::ForeignKey`.
    pub fn insert_message(
        &self,
        from_username: &str,
        to_username: &str,
        body: &str,
    ) -> Result<MessageRow, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (from_username, to_username, body, sent_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![from_username, to_username, body, now],
            )
            .map_err(StoreError::classify)?;
            Ok(MessageRow {
                id: conn.last_insert_rowid(),
                from_username: from_username.to_string(),
                to_username: to_username.to_string(),
                body: body.to_string(),
                sent_at: now.clone(),
                read_at: None,
            })
        })
    }

    /// Fetch a message with both parties' profile fields in one query.
    pub fn get_message(&self, id: i64) -> Result<Option<MessageDetailRow>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT m.id, m.body, m.sent_at, m.read_at,
                            f.username, f.first_name, f.last_name, f.phone,
                            t.username, t.first_name, t.last_name, t.phone
                     FROM messages m
                     JOIN users f ON m.from_username = f.username
                     JOIN users t ON m.to_username = t.username
                     WHERE m.id = ?1",
                    [id],
                    |row| {
                        Ok(MessageDetailRow {
                            id: row.get(0)?,
                            body: row.get(1)?,
                            sent_at: row.get(2)?,
                            read_at: row.get(3)?,
                            from_username: row.get(4)?,
                            from_first_name: row.get(5)?,
                            from_last_name: row.get(6)?,
                            from_phone: row.get(7)?,
                            to_username: row.get(8)?,
                            to_first_name: row.get(9)?,
                            to_last_name: row.get(10)?,
                            to_phone: row.get(11)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Set read_at to now, unconditionally. Returns the new timestamp, or
    /// None if no message with that id exists.
    pub fn mark_read(&self, id: i64) -> Result<Option<String>, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE messages SET read_at = ?1 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
            if affected == 0 {
                Ok(None)
            } else {
                Ok(Some(now.clone()))
            }
        })
    }

    /// Messages sent by this user, joined against each recipient's profile.
    /// An unknown username simply yields an empty list.
    pub fn messages_from(&self, username: &str) -> Result<Vec<CounterpartMessageRow>, StoreError> {
        self.with_conn(|conn| {
            query_counterpart_messages(
                conn,
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 JOIN users u ON m.to_username = u.username
                 WHERE m.from_username = ?1
                 ORDER BY m.sent_at",
                username,
            )
        })
    }

    /// Messages sent to this user, joined against each sender's profile.
    pub fn messages_to(&self, username: &str) -> Result<Vec<CounterpartMessageRow>, StoreError> {
        self.with_conn(|conn| {
            query_counterpart_messages(
                conn,
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 JOIN users u ON m.from_username = u.username
                 WHERE m.to_username = ?1
                 ORDER BY m.sent_at",
                username,
            )
        })
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        username: row.get(0)?,
        password: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
        join_at: row.get(5)?,
        last_login_at: row.get(6)?,
    })
}

fn query_user(conn: &Connection, username: &str) -> Result<Option<UserRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT username, password, first_name, last_name, phone, join_at, last_login_at
         FROM users WHERE username = ?1",
    )?;
    let row = stmt.query_row([username], user_from_row).optional()?;
    Ok(row)
}

fn query_counterpart_messages(
    conn: &Connection,
    sql: &str,
    username: &str,
) -> Result<Vec<CounterpartMessageRow>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([username], |row| {
            Ok(CounterpartMessageRow {
                id: row.get(0)?,
                body: row.get(1)?,
                sent_at: row.get(2)?,
                read_at: row.get(3)?,
                counterpart_username: row.get(4)?,
                counterpart_first_name: row.get(5)?,
                counterpart_last_name: row.get(6)?,
                counterpart_phone: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, username: &str) {
        db.create_user(username, "hash", "First", "Last", "555-0000")
            .unwrap();
    }

    #[test]
    fn create_user_sets_both_timestamps() {
        let db = db();
        let row = db
            .create_user("alice", "h", "A", "L", "111")
            .unwrap();
        assert_eq!(row.join_at, row.last_login_at);

        let fetched = db.get_user("alice").unwrap().unwrap();
        assert_eq!(fetched.join_at, row.join_at);
        assert_eq!(fetched.password, "h");
    }

    #[test]
    fn duplicate_username_is_conflict() {
        let db = db();
        seed_user(&db, "alice");
        let err = db
            .create_user("alice", "h2", "A", "L", "222")
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[test]
    fn unknown_user_lookup_is_none() {
        let db = db();
        assert!(db.get_user("nobody").unwrap().is_none());
        assert!(db.get_user_password("nobody").unwrap().is_none());
    }

    #[test]
    fn update_last_login_reports_affected_rows() {
        let db = db();
        seed_user(&db, "alice");
        assert_eq!(db.update_last_login("alice").unwrap(), 1);
        assert_eq!(db.update_last_login("nobody").unwrap(), 0);
    }

    #[test]
    fn insert_message_requires_existing_parties() {
        let db = db();
        seed_user(&db, "alice");
        let err = db.insert_message("alice", "ghost", "hi").unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey));

        let err = db.insert_message("ghost", "alice", "hi").unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey));
    }

    #[test]
    fn message_ids_are_monotonic() {
        let db = db();
        seed_user(&db, "alice");
        seed_user(&db, "bob");
        let m1 = db.insert_message("alice", "bob", "one").unwrap();
        let m2 = db.insert_message("alice", "bob", "two").unwrap();
        assert!(m2.id > m1.id);
    }

    #[test]
    fn mark_read_transitions_absent_to_present() {
        let db = db();
        seed_user(&db, "alice");
        seed_user(&db, "bob");
        let msg = db.insert_message("alice", "bob", "hi").unwrap();

        let before = db.get_message(msg.id).unwrap().unwrap();
        assert!(before.read_at.is_none());

        let read_at = db.mark_read(msg.id).unwrap();
        assert!(read_at.is_some());

        let after = db.get_message(msg.id).unwrap().unwrap();
        assert_eq!(after.read_at, read_at);
    }

    #[test]
    fn mark_read_unknown_id_is_none() {
        let db = db();
        assert!(db.mark_read(999).unwrap().is_none());
    }

    #[test]
    fn get_message_joins_both_profiles() {
        let db = db();
        db.create_user("alice", "h", "Alice", "Anders", "111")
            .unwrap();
        db.create_user("bob", "h", "Bob", "Baker", "222").unwrap();
        let msg = db.insert_message("alice", "bob", "hello").unwrap();

        let detail = db.get_message(msg.id).unwrap().unwrap();
        assert_eq!(detail.from_username, "alice");
        assert_eq!(detail.from_first_name, "Alice");
        assert_eq!(detail.to_username, "bob");
        assert_eq!(detail.to_phone, "222");
        assert_eq!(detail.body, "hello");
    }

    #[test]
    fn counterpart_listings_join_the_other_party() {
        let db = db();
        db.create_user("alice", "h", "Alice", "Anders", "111")
            .unwrap();
        db.create_user("bob", "h", "Bob", "Baker", "222").unwrap();
        db.insert_message("alice", "bob", "hello").unwrap();

        let from_alice = db.messages_from("alice").unwrap();
        assert_eq!(from_alice.len(), 1);
        assert_eq!(from_alice[0].counterpart_username, "bob");

        let to_bob = db.messages_to("bob").unwrap();
        assert_eq!(to_bob.len(), 1);
        assert_eq!(to_bob[0].counterpart_username, "alice");

        // No existence check: unknown usernames yield empty lists.
        assert!(db.messages_from("ghost").unwrap().is_empty());
        assert!(db.messages_to("ghost").unwrap().is_empty());
    }
}
