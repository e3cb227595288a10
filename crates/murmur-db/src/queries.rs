use crate::models::{MessageRow, UserRow};
use crate::Database;
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use murmur_types::models::User;
use rusqlite::{Connection, ErrorCode};

/// Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`
/// suffix) so that ordering by the column is chronological.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    // -- Users --

    /// Insert a new user. Returns `None` if the username is already taken.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<Option<i64>> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO users (username, password, created_at) VALUES (?1, ?2, ?3)",
                (username, password_hash, &now),
            ) {
                Ok(_) => Ok(Some(conn.last_insert_rowid())),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Every user except `exclude_id`, ordered by id.
    pub fn list_users_except(&self, exclude_id: i64) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, username FROM users WHERE id != ?1 ORDER BY id")?;

            let users = stmt
                .query_map([exclude_id], |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(users)
        })
    }

    // -- Tokens --

    /// Return the user's token, creating it with `new_key` if none exists yet.
    /// A user never holds more than one token.
    pub fn issue_or_fetch_token<F>(&self, user_id: i64, new_key: F) -> Result<String>
    where
        F: FnOnce() -> String,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row("SELECT key FROM tokens WHERE user_id = ?1", [user_id], |row| {
                    row.get(0)
                })
                .optional()?;

            let key = match existing {
                Some(key) => key,
                None => {
                    let key = new_key();
                    tx.execute(
                        "INSERT INTO tokens (key, user_id, created_at) VALUES (?1, ?2, ?3)",
                        rusqlite::params![key, user_id, format_timestamp(Utc::now())],
                    )?;
                    key
                }
            };

            tx.commit()?;
            Ok(key)
        })
    }

    pub fn get_user_by_token(&self, key: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT u.id, u.username, u.password, u.created_at
                 FROM tokens t
                 JOIN users u ON u.id = t.user_id
                 WHERE t.key = ?1",
                [key],
                map_user_row,
            )
            .optional()
        })
    }

    // -- Messages --

    /// Append a message and return its id.
    pub fn insert_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let ts = format_timestamp(created_at);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![sender_id, receiver_id, content, ts],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Full thread between two users in either direction, oldest first.
    pub fn get_conversation(&self, user_a: i64, user_b: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_conversation(conn, user_a, user_b))
    }
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn query_user<P: rusqlite::ToSql>(
    conn: &Connection,
    predicate: &str,
    value: P,
) -> Result<Option<UserRow>> {
    let sql = format!("SELECT id, username, password, created_at FROM users WHERE {predicate}");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], map_user_row).optional()
}

fn query_conversation(conn: &Connection, user_a: i64, user_b: i64) -> Result<Vec<MessageRow>> {
    // JOIN users to fetch sender_username in a single query
    let mut stmt = conn.prepare(
        "SELECT m.id, m.sender_id, u.username, m.receiver_id, m.content, m.created_at
         FROM messages m
         JOIN users u ON m.sender_id = u.id
         WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
            OR (m.sender_id = ?2 AND m.receiver_id = ?1)
         ORDER BY m.created_at ASC, m.id ASC",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![user_a, user_b], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                sender_username: row.get(2)?,
                receiver_id: row.get(3)?,
                content: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn db_with_users(names: &[&str]) -> (Database, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        let ids = names
            .iter()
            .map(|n| db.create_user(n, "hash").unwrap().unwrap())
            .collect();
        (db, ids)
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let (db, ids) = db_with_users(&["alice"]);
        assert!(db.create_user("alice", "other").unwrap().is_none());

        let row = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(row.id, ids[0]);
        assert_eq!(row.password, "hash");
        assert_eq!(db.list_users_except(-1).unwrap().len(), 1);
    }

    #[test]
    fn token_is_issued_once() {
        let (db, ids) = db_with_users(&["alice"]);

        let first = db.issue_or_fetch_token(ids[0], || "k1".into()).unwrap();
        let second = db
            .issue_or_fetch_token(ids[0], || panic!("token should already exist"))
            .unwrap();
        assert_eq!(first, "k1");
        assert_eq!(second, "k1");

        let owner = db.get_user_by_token("k1").unwrap().unwrap();
        assert_eq!(owner.username, "alice");
        assert!(db.get_user_by_token("nope").unwrap().is_none());
    }

    #[test]
    fn list_users_excludes_caller() {
        let (db, ids) = db_with_users(&["alice", "bob", "carol"]);

        let users = db.list_users_except(ids[1]).unwrap();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "carol"]);
    }

    #[test]
    fn conversation_is_symmetric_and_ordered() {
        let (db, ids) = db_with_users(&["alice", "bob", "carol"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        // Inserted out of time order, with one timestamp collision.
        let m3 = db.insert_message(a, b, "third", t0 + chrono::Duration::seconds(2)).unwrap();
        let m1 = db.insert_message(b, a, "first", t0).unwrap();
        let m2 = db.insert_message(a, b, "second", t0).unwrap();
        db.insert_message(a, c, "elsewhere", t0).unwrap();

        let ab: Vec<i64> = db.get_conversation(a, b).unwrap().iter().map(|m| m.id).collect();
        let ba: Vec<i64> = db.get_conversation(b, a).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ab, vec![m1, m2, m3]);
        assert_eq!(ab, ba);

        let thread = db.get_conversation(b, a).unwrap();
        assert_eq!(thread[0].sender_username, "bob");
        assert_eq!(thread[0].created_at, "2024-01-01T12:00:00.000000Z");
    }

    #[test]
    fn self_conversation_only_contains_notes_to_self() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let now = Utc::now();
        db.insert_message(ids[0], ids[0], "note", now).unwrap();
        db.insert_message(ids[0], ids[1], "hi", now).unwrap();

        let thread = db.get_conversation(ids[0], ids[0]).unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].content, "note");
    }
}
