/// Database row types — these map directly to SQLite rows.
/// Distinct from the parley-types API models to keep the DB layer flat:
/// all nested counterpart shaping happens in the service layer.

#[derive(Debug)]
pub struct UserRow {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub join_at: String,
    pub last_login_at: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: i64,
    pub from_username: String,
    pub to_username: String,
    pub body: String,
    pub sent_at: String,
    pub read_at: Option<String>,
}

/// A message joined against the *other* party's profile fields, for the
/// sent/received listings.
#[derive(Debug)]
pub struct CounterpartMessageRow {
    pub id: i64,
    pub body: String,
    pub sent_at: String,
    pub read_at: Option<String>,
    pub counterpart_username: String,
    pub counterpart_first_name: String,
    pub counterpart_last_name: String,
    pub counterpart_phone: String,
}

/// A single message joined against both parties' profile fields.
#[derive(Debug)]
pub struct MessageDetailRow {
    pub id: i64,
    pub body: String,
    pub sent_at: String,
    pub read_at: Option<String>,
    pub from_username: String,
    pub from_first_name: String,
    pub from_last_name: String,
    pub from_phone: String,
    pub to_username: String,
    pub to_first_name: String,
    pub to_last_name: String,
    pub to_phone: String,
}
