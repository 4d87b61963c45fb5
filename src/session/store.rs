//! 会话存储抽象层
//!
//! 统一的加载 / 创建 / 保存接口，支持内存和 SQLite 两种实现。两者都以 JSON 快照保存整个会话，
//! 保证每次保存 / 加载都走一遍序列化。同一会话的单写者语义由调用方保证。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Session;
use crate::core::DialogError;

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 按用户键加载会话
    async fn load(&self, key: &str) -> Result<Option<Session>, DialogError>;

    /// 创建并保存一个新会话
    async fn create(&self, key: &str) -> Result<Session, DialogError>;

    async fn save(&self, session: &Session) -> Result<(), DialogError>;

    async fn remove(&self, key: &str) -> Result<(), DialogError>;
}

/// 内存会话存储
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<Session>, DialogError> {
        let sessions = self.sessions.read().await;
        sessions.get(key).map(|json| Session::from_json(json)).transpose()
    }

    async fn create(&self, key: &str) -> Result<Session, DialogError> {
        let session = Session::new(key);
        self.save(&session).await?;
        tracing::info!("Created session {} for {}", session.id, key);
        Ok(session)
    }

    async fn save(&self, session: &Session) -> Result<(), DialogError> {
        let json = session.to_json()?;
        self.sessions.write().await.insert(session.user_key.clone(), json);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DialogError> {
        self.sessions.write().await.remove(key);
        Ok(())
    }
}

/// SQLite 会话存储：一张表，按用户键保存 JSON 快照
#[cfg(feature = "async-sqlite")]
pub struct SqliteSessionStore {
    pool: sqlx::sqlite::SqlitePool,
    session_ttl_secs: u64,
}

#[cfg(feature = "async-sqlite")]
impl SqliteSessionStore {
    pub async fn new(db_path: impl AsRef<std::path::Path>, session_ttl_secs: u64) -> Result<Self, DialogError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(store_err)?;
        let store = Self { pool, session_ttl_secs };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), DialogError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS dialog_sessions (
                user_key TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    /// 删除超过 TTL 未更新的会话，返回删除条数
    pub async fn cleanup_expired(&self) -> Result<u64, DialogError> {
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds(self.session_ttl_secs as i64);
        let result = sqlx::query("DELETE FROM dialog_sessions WHERE updated_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }
}

#[cfg(feature = "async-sqlite")]
fn store_err(e: sqlx::Error) -> DialogError {
    DialogError::Store(e.to_string())
}

#[cfg(feature = "async-sqlite")]
#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, key: &str) -> Result<Option<Session>, DialogError> {
        use sqlx::Row;

        let row = sqlx::query("SELECT snapshot FROM dialog_sessions WHERE user_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        match row {
            Some(row) => {
                let snapshot: String = row.get("snapshot");
                Ok(Some(Session::from_json(&snapshot)?))
            }
            None => Ok(None),
        }
    }

    async fn create(&self, key: &str) -> Result<Session, DialogError> {
        let session = Session::new(key);
        self.save(&session).await?;
        tracing::info!("Created session {} for {}", session.id, key);
        Ok(session)
    }

    async fn save(&self, session: &Session) -> Result<(), DialogError> {
        let snapshot = session.to_json()?;
        sqlx::query(
            "INSERT INTO dialog_sessions (user_key, session_id, snapshot, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_key) DO UPDATE SET
                session_id = excluded.session_id,
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at",
        )
        .bind(&session.user_key)
        .bind(session.id.to_string())
        .bind(&snapshot)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DialogError> {
        sqlx::query("DELETE FROM dialog_sessions WHERE user_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySessionStore::new();
        assert!(store.load("u1").await.unwrap().is_none());
        let mut session = store.create("u1").await.unwrap();
        session.turn_id = 3;
        store.save(&session).await.unwrap();
        let loaded = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.turn_id, 3);
        store.remove("u1").await.unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[cfg(feature = "async-sqlite")]
    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::new(dir.path().join("sessions.db"), 3600).await.unwrap();
        let mut session = store.create("u1").await.unwrap();
        session.turn_id = 5;
        store.save(&session).await.unwrap();
        let loaded = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded.turn_id, 5);
        assert_eq!(store.cleanup_expired().await.unwrap(), 0);
        store.remove("u1").await.unwrap();
        assert!(store.load("u1").await.unwrap().is_none());
    }
}
