//! User records and the user store
//!
//! The auth layer only ever needs to find users by id or email and to
//! create them at registration. `InMemoryUserStore` backs tests and
//! database-less development; `PgUserStore` is the PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// User account as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub username: String,
    /// Argon2 PHC string, never serialized
    #[serde(skip_serializing, default)]
    pub hashed_password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Data needed to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub hashed_password: String,
}

/// User store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    DuplicateIdentity(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    fn duplicate_email() -> Self {
        Self::DuplicateIdentity("Email already registered".to_string())
    }

    fn duplicate_username() -> Self {
        Self::DuplicateIdentity("Username already taken".to_string())
    }
}

/// Lookup and creation of user records
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by numeric id
    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError>;

    /// Find a user by email address
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Create a user; email and username must both be unused
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local user store
#[derive(Debug)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<i64, UserRecord>>,
    next_id: AtomicI64,
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate or deactivate a user. Returns false if the id is unknown.
    pub async fn set_active(&self, id: i64, active: bool) -> bool {
        match self.users.write().await.get_mut(&id) {
            Some(user) => {
                user.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        // Uniqueness check and insert under one write lock
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::duplicate_email());
        }
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::duplicate_username());
        }

        let record = UserRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            email: user.email,
            username: user.username,
            hashed_password: user.hashed_password,
            is_active: true,
            created_at: Utc::now(),
        };
        users.insert(record.id, record.clone());

        Ok(record)
    }
}

// ============================================================================
// PostgreSQL store
// ============================================================================

const USERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL,
        username TEXT NOT NULL UNIQUE,
        hashed_password TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

/// Emails are unique regardless of case, matching `find_user_by_email`
const EMAIL_INDEX: &str = "users_email_lower_key";

const USERS_EMAIL_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS users_email_lower_key ON users (lower(email))";

/// PostgreSQL user store
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new store connection
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create the users table and its indexes if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in [USERS_TABLE, USERS_EMAIL_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(format!("Failed to create users schema: {e}")))?;
        }
        Ok(())
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    username: String,
    hashed_password: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        UserRecord {
            id: row.id,
            email: row.email,
            username: row.username,
            hashed_password: row.hashed_password,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return duplicate_for_constraint(db_err.constraint());
        }
    }
    StoreError::Database(format!("Failed to create user: {err}"))
}

fn duplicate_for_constraint(constraint: Option<&str>) -> StoreError {
    match constraint {
        Some(EMAIL_INDEX) => StoreError::duplicate_email(),
        Some(c) if c.contains("username") => StoreError::duplicate_username(),
        _ => StoreError::duplicate_email(),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, username, hashed_password, is_active, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to fetch user: {e}")))?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, username, hashed_password, is_active, created_at FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to fetch user: {e}")))?;

        Ok(row.map(UserRecord::from))
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (email, username, hashed_password)
            VALUES ($1, $2, $3)
            RETURNING id, email, username, hashed_password, is_active, created_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;

        tracing::debug!(user_id = row.id, "Created user");

        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            username: username.to_string(),
            hashed_password: "$argon2id$placeholder".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryUserStore::new();
        let created = store
            .create_user(new_user("alice@example.com", "alice"))
            .await
            .unwrap();

        assert_eq!(created.id, 1);
        assert!(created.is_active);

        let by_id = store.find_user_by_id(created.id).await.unwrap();
        assert_eq!(by_id.as_ref(), Some(&created));

        let by_email = store.find_user_by_email("ALICE@example.com").await.unwrap();
        assert_eq!(by_email, Some(created));

        assert!(store.find_user_by_id(99).await.unwrap().is_none());
        assert!(store
            .find_user_by_email("nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_ids_are_sequential() {
        tokio_test::block_on(async {
            let store = InMemoryUserStore::new();
            let a = store.create_user(new_user("a@example.com", "a")).await.unwrap();
            let b = store.create_user(new_user("b@example.com", "b")).await.unwrap();
            assert_eq!(b.id, a.id + 1);
            assert_eq!(store.len().await, 2);
        });
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryUserStore::new();
        store
            .create_user(new_user("dup@example.com", "user1"))
            .await
            .unwrap();

        let err = store
            .create_user(new_user("dup@example.com", "user2"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateIdentity(ref m) if m.contains("already registered")));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = InMemoryUserStore::new();
        store
            .create_user(new_user("one@example.com", "same"))
            .await
            .unwrap();

        let err = store
            .create_user(new_user("two@example.com", "same"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateIdentity(ref m) if m.contains("Username")));
    }

    #[tokio::test]
    async fn test_set_active() {
        let store = InMemoryUserStore::new();
        let user = store
            .create_user(new_user("c@example.com", "c"))
            .await
            .unwrap();

        assert!(store.set_active(user.id, false).await);
        let found = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert!(!found.is_active);

        assert!(!store.set_active(404, false).await);
    }

    #[test]
    fn test_hashed_password_not_serialized() {
        let user = UserRecord {
            id: 1,
            email: "d@example.com".to_string(),
            username: "d".to_string(),
            hashed_password: "$argon2id$secret".to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("d@example.com"));
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database at DATABASE_URL"]
    async fn test_pg_store_roundtrip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgUserStore::new(&url).await.unwrap();
        store.ensure_schema().await.unwrap();

        let email = format!("pg-{}@example.com", Utc::now().timestamp_nanos_opt().unwrap());
        let created = store
            .create_user(new_user(&email, &email))
            .await
            .unwrap();
        let found = store.find_user_by_email(&email).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);

        let err = store.create_user(new_user(&email, "other")).await.unwrap_err();
        assert_eq!(err.to_string(), "Email already registered");

        // Same address, different case
        let shouted = email.to_uppercase();
        let err = store
            .create_user(new_user(&shouted, &format!("{email}-upper")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Email already registered");
        let found = store.find_user_by_email(&shouted).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);

        let err = store
            .create_user(new_user(&format!("other-{email}"), &email))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Username already taken");
    }

    #[test]
    fn test_unique_violation_constraint_mapping() {
        assert_eq!(
            duplicate_for_constraint(Some("users_email_lower_key")).to_string(),
            "Email already registered"
        );
        assert_eq!(
            duplicate_for_constraint(Some("users_username_key")).to_string(),
            "Username already taken"
        );
        assert_eq!(
            duplicate_for_constraint(None).to_string(),
            "Email already registered"
        );
    }

    #[tokio::test]
    async fn test_email_uniqueness_ignores_case() {
        let store = InMemoryUserStore::new();
        let first = store
            .create_user(new_user("Mixed@Example.com", "mixed"))
            .await
            .unwrap();

        let err = store
            .create_user(new_user("mixed@example.com", "mixed2"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Email already registered");

        let found = store.find_user_by_email("MIXED@EXAMPLE.COM").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(first.id));
    }
}
