/// Database row types. These map directly to SQLite rows and are kept
/// distinct from the murmur-types API models.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub sender_username: String,
    pub receiver_id: i64,
    pub content: String,
    pub created_at: String,
}
