use chrono::{DateTime, Utc};
use serde::Serialize;

/// A row in the `users` table, mirroring an external identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// An identity to register. `id` comes from the identity provider verbatim.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub username: String,
}
