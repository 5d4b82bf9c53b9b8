use std::path::{Path, PathBuf};

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;
use uuid::Uuid;

use super::conversation_store::{
    BoxFuture, ConversationRecord, ConversationStore, MessageRecord, NewMessage,
};
use super::error::{StoreError, StoreResult};
use crate::models::message::MessageRole;

/// Migrations applied in order. Each entry is (version, sql).
/// To add a new migration: append a tuple with the next version number and its SQL.
/// Never edit or remove existing entries — existing databases depend on them.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS conversations (
        id         TEXT    PRIMARY KEY,
        owner_id   TEXT    NOT NULL,
        title      TEXT    NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_conversations_owner
        ON conversations (owner_id, updated_at DESC);
    CREATE TABLE IF NOT EXISTS messages (
        id              TEXT    PRIMARY KEY,
        conversation_id TEXT    NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        role            TEXT    NOT NULL,
        content         TEXT    NOT NULL DEFAULT '',
        parts           TEXT,
        created_at      INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_messages_conversation
        ON messages (conversation_id, created_at DESC);",
)];

/// SQLite-backed conversation store.
///
/// Uses WAL journal mode so readers are not blocked by the deferred
/// background saves. `SqlitePool` is internally reference-counted and cheap
/// to clone.
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// Open (or create) the database at the given path.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref();

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        info!(path = %db_path.display(), "Opened SQLite conversation database");

        Ok(Self { pool })
    }

    /// Open the database at the platform-specific config path.
    pub async fn open_default() -> StoreResult<Self> {
        Self::open(Self::default_db_path()?).await
    }

    fn default_db_path() -> StoreResult<PathBuf> {
        dirs::config_dir()
            .ok_or_else(|| StoreError::Initialization {
                message: "Cannot find config directory".into(),
            })
            .map(|p| p.join("driftchat").join("conversations.db"))
    }

    /// Create the schema_version table if absent, then apply any pending migrations.
    async fn run_migrations(pool: &SqlitePool) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        // Seed version 0 if the table is empty (fresh database).
        sqlx::query("INSERT INTO schema_version (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version)")
            .execute(pool)
            .await?;

        let current: i64 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                info!(version, "Applying schema migration");
                // sqlx doesn't support multiple statements in a single query call,
                // so split on ';' and execute each statement individually.
                for statement in sql.split(';') {
                    let trimmed = statement.trim();
                    if !trimmed.is_empty() {
                        sqlx::query(trimmed).execute(pool).await?;
                    }
                }
                sqlx::query("UPDATE schema_version SET version = ?")
                    .bind(version)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }
}

impl Clone for SqliteConversationStore {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> StoreResult<MessageRecord> {
    let role_str: String = row.get("role");
    let role = MessageRole::parse(&role_str).ok_or_else(|| StoreError::InvalidData {
        message: format!("Unknown message role: {role_str}"),
    })?;

    Ok(MessageRecord {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role,
        content: row.get("content"),
        parts: row.get("parts"),
        created_at: row.get("created_at"),
    })
}

impl ConversationStore for SqliteConversationStore {
    fn find_conversation(
        &self,
        id: &str,
        owner_id: &str,
    ) -> BoxFuture<'static, StoreResult<Option<ConversationRecord>>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, owner_id, title, created_at, updated_at
                 FROM conversations
                 WHERE id = ? AND owner_id = ?",
            )
            .bind(&id)
            .bind(&owner_id)
            .fetch_optional(&pool)
            .await?;

            Ok(row.map(|r| ConversationRecord {
                id: r.get("id"),
                owner_id: r.get("owner_id"),
                title: r.get("title"),
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
            }))
        })
    }

    fn create_conversation(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
    ) -> BoxFuture<'static, StoreResult<ConversationRecord>> {
        let pool = self.pool.clone();
        let record = ConversationRecord {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now().timestamp_millis(),
            updated_at: Utc::now().timestamp_millis(),
        };
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO conversations (id, owner_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&record.id)
            .bind(&record.owner_id)
            .bind(&record.title)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&pool)
            .await?;

            Ok(record)
        })
    }

    fn insert_messages(
        &self,
        conversation_id: &str,
        rows: Vec<NewMessage>,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let pool = self.pool.clone();
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            if rows.is_empty() {
                return Ok(());
            }

            let now = Utc::now().timestamp_millis();
            let mut tx = pool.begin().await?;

            for row in &rows {
                sqlx::query(
                    "INSERT INTO messages (id, conversation_id, role, content, parts, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&conversation_id)
                .bind(row.role.as_str())
                .bind(&row.content)
                .bind(&row.parts)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(&conversation_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        })
    }

    fn update_title(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let pool = self.pool.clone();
        let conversation_id = conversation_id.to_string();
        let title = title.to_string();
        Box::pin(async move {
            sqlx::query("UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?")
                .bind(&title)
                .bind(Utc::now().timestamp_millis())
                .bind(&conversation_id)
                .execute(&pool)
                .await?;
            Ok(())
        })
    }

    fn list_recent_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> BoxFuture<'static, StoreResult<Vec<MessageRecord>>> {
        let pool = self.pool.clone();
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            // rowid breaks ties for rows inserted within the same millisecond.
            let rows = sqlx::query(
                "SELECT id, conversation_id, role, content, parts, created_at
                 FROM messages
                 WHERE conversation_id = ?
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?",
            )
            .bind(&conversation_id)
            .bind(limit)
            .fetch_all(&pool)
            .await?;

            rows.iter().map(row_to_message).collect()
        })
    }

    fn delete_conversation(&self, id: &str) -> BoxFuture<'static, StoreResult<()>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        Box::pin(async move {
            sqlx::query("DELETE FROM conversations WHERE id = ?")
                .bind(&id)
                .execute(&pool)
                .await?;
            Ok(())
        })
    }

    fn delete_message(&self, id: &str) -> BoxFuture<'static, StoreResult<()>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        Box::pin(async move {
            sqlx::query("DELETE FROM messages WHERE id = ?")
                .bind(&id)
                .execute(&pool)
                .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, SqliteConversationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteConversationStore::open(dir.path().join("test.db"))
            .await
            .unwrap();
        (dir, store)
    }

    fn text_row(role: MessageRole, content: &str) -> NewMessage {
        NewMessage {
            role,
            content: content.to_string(),
            parts: None,
        }
    }

    #[tokio::test]
    async fn test_find_is_scoped_to_owner() {
        let (_dir, store) = temp_store().await;
        store
            .create_conversation("conv-1", "alice", "Greetings")
            .await
            .unwrap();

        assert!(
            store
                .find_conversation("conv-1", "alice")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_conversation("conv-1", "mallory")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_insert_and_list_newest_first() {
        let (_dir, store) = temp_store().await;
        store
            .create_conversation("conv-1", "alice", "Greetings")
            .await
            .unwrap();

        store
            .insert_messages("conv-1", vec![text_row(MessageRole::User, "hi")])
            .await
            .unwrap();
        store
            .insert_messages("conv-1", vec![text_row(MessageRole::Assistant, "hello")])
            .await
            .unwrap();

        let recent = store.list_recent_messages("conv-1", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].role, MessageRole::Assistant);
        assert_eq!(recent[0].content, "hello");
        assert_eq!(recent[1].content, "hi");

        let limited = store.list_recent_messages("conv-1", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].content, "hello");
    }

    #[tokio::test]
    async fn test_batch_insert_preserves_order() {
        let (_dir, store) = temp_store().await;
        store
            .create_conversation("conv-1", "alice", "Greetings")
            .await
            .unwrap();

        store
            .insert_messages(
                "conv-1",
                vec![
                    text_row(MessageRole::User, "one"),
                    text_row(MessageRole::User, "two"),
                ],
            )
            .await
            .unwrap();

        let recent = store.list_recent_messages("conv-1", 10).await.unwrap();
        assert_eq!(recent[0].content, "two");
        assert_eq!(recent[1].content, "one");
    }

    #[tokio::test]
    async fn test_delete_conversation_cascades() {
        let (_dir, store) = temp_store().await;
        store
            .create_conversation("conv-1", "alice", "Greetings")
            .await
            .unwrap();
        store
            .insert_messages("conv-1", vec![text_row(MessageRole::User, "hi")])
            .await
            .unwrap();

        store.delete_conversation("conv-1").await.unwrap();

        let recent = store.list_recent_messages("conv-1", 10).await.unwrap();
        assert!(recent.is_empty());
    }

    #[tokio::test]
    async fn test_delete_single_message() {
        let (_dir, store) = temp_store().await;
        store
            .create_conversation("conv-1", "alice", "Greetings")
            .await
            .unwrap();
        store
            .insert_messages("conv-1", vec![text_row(MessageRole::User, "hi")])
            .await
            .unwrap();

        let recent = store.list_recent_messages("conv-1", 1).await.unwrap();
        store.delete_message(&recent[0].id).await.unwrap();

        assert!(
            store
                .list_recent_messages("conv-1", 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_update_title() {
        let (_dir, store) = temp_store().await;
        store
            .create_conversation("conv-1", "alice", "New Chat")
            .await
            .unwrap();

        store.update_title("conv-1", "Weather in Recife").await.unwrap();

        let found = store
            .find_conversation("conv-1", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.title, "Weather in Recife");
    }

    #[tokio::test]
    async fn test_insert_into_missing_conversation_fails() {
        let (_dir, store) = temp_store().await;
        let result = store
            .insert_messages("ghost", vec![text_row(MessageRole::User, "hi")])
            .await;
        assert!(result.is_err());
    }
}
