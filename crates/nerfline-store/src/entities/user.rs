use std::future::Future;

use nerfline_types::Entity;
use tracing::info;

use crate::entities::cascade::delete_cascading;
use crate::entities::dao::{CascadeReport, NewUser, UserRecord};
use crate::entities::{SqliteStore, parse_rfc3339, require_text, to_rfc3339};
use crate::error::StoreError;

/// Local mirror of identities owned by the external identity provider.
pub trait UserStore: Send + Sync + 'static {
    fn insert_user(
        &self,
        user: NewUser,
    ) -> impl Future<Output = Result<UserRecord, StoreError>> + Send;
    fn get_user(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, StoreError>> + Send;
    /// Removes every record the user owns, and everything downstream of those.
    fn delete_user(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;
}

impl UserStore for SqliteStore {
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        require_text("user id", &user.id, 255)?;
        require_text("username", &user.username, 150)?;
        let record = UserRecord {
            id: user.id,
            username: user.username,
            created_at: self.now(),
        };
        sqlx::query("INSERT INTO users (id, username, created_at) VALUES (?1, ?2, ?3)")
            .bind(&record.id)
            .bind(&record.username)
            .bind(to_rfc3339(record.created_at))
            .execute(self.pool())
            .await
            .map_err(|e| StoreError::from_unique(e, Entity::User, "id", &record.id))?;
        info!(user_id = %record.id, "user registered");
        Ok(record)
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT id, username, created_at FROM users WHERE id = ?1")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        row.map(|(id, username, created_at)| {
            let created_at = parse_rfc3339(Entity::User, &id, "created_at", &created_at)?;
            Ok::<_, StoreError>(UserRecord { id, username, created_at })
        })
        .transpose()
    }

    async fn delete_user(&self, id: &str) -> Result<CascadeReport, StoreError> {
        delete_cascading(self.pool(), Entity::User, id).await
    }
}
