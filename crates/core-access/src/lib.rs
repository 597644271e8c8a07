//! # Core Access Crate
//!
//! This crate is the central authority for identity, authentication (AuthN),
//! and role membership for the `rolerag` application. It owns the `roles` and
//! `users` tables and the two role sentinels that every visibility rule in the
//! workspace is built on.

pub mod password;

pub use password::{hash_password, verify_password, DEFAULT_PASSWORD_COST};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use turso::{Database, Error as TursoError, Row, params};

/// The privileged role. Members see every table and document.
pub const PRIVILEGED_ROLE: &str = "C-Level";

/// The shared role. Tables and documents tagged with it are visible to everyone.
pub const GENERAL_ROLE: &str = "general";

/// Table definitions owned by this crate. Idempotent.
pub const ACCESS_TABLE_CREATION_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS roles (
        role_name TEXT PRIMARY KEY,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS users (
        username TEXT PRIMARY KEY,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );",
];

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Database error: {0}")]
    Database(#[from] TursoError),
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
    #[error("Role '{0}' already exists")]
    RoleExists(String),
    #[error("Invalid role name: '{0}'")]
    InvalidRole(String),
    #[error("Role '{0}' does not exist")]
    UnknownRole(String),
    #[error("User '{0}' already exists")]
    UserExists(String),
    #[error("Invalid username: '{0}'")]
    InvalidUsername(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Password hashing failed: {0}")]
    PasswordHashing(String),
}

/// Represents a user in the system.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    /// The unique login name.
    pub username: String,
    /// The role the user acts under. Exactly one per user.
    pub role: String,
    /// The timestamp when the user was first created.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&Row> for User {
    type Error = AccessError;

    fn try_from(row: &Row) -> std::result::Result<Self, Self::Error> {
        let created_at_str: String = row.get(2)?;
        let created_at =
            chrono::NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
                .map_err(|e| {
                    AccessError::DataIntegrity(format!(
                        "Failed to parse date '{created_at_str}': {e}"
                    ))
                })?;

        Ok(User {
            username: row.get(0)?,
            role: row.get(1)?,
            created_at,
        })
    }
}

/// Returns true for the privileged sentinel, ignoring case.
pub fn is_privileged(role: &str) -> bool {
    role.eq_ignore_ascii_case(PRIVILEGED_ROLE)
}

/// Returns true for the shared sentinel, ignoring case.
pub fn is_general(role: &str) -> bool {
    role.eq_ignore_ascii_case(GENERAL_ROLE)
}

/// Creates the `roles` and `users` tables if they are missing.
pub async fn initialize_access_schema(db: &Database) -> Result<(), AccessError> {
    let conn = db.connect()?;
    for statement in ACCESS_TABLE_CREATION_SQL {
        conn.execute(statement, ()).await?;
    }
    Ok(())
}

/// Looks a role up case-insensitively and returns its stored spelling.
pub async fn find_role(db: &Database, role_name: &str) -> Result<Option<String>, AccessError> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "SELECT role_name FROM roles WHERE LOWER(role_name) = LOWER(?) LIMIT 1",
            params![role_name.trim()],
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Returns true if `role_name` uses only ASCII letters, digits, spaces, `_` and `-`
/// and contains at least one letter or digit. Role names double as upload directories.
pub fn is_valid_role_name(role_name: &str) -> bool {
    role_name.chars().any(|c| c.is_ascii_alphanumeric())
        && role_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
}

/// Creates a new role. Role names are unique regardless of case.
pub async fn create_role(db: &Database, role_name: &str) -> Result<String, AccessError> {
    let role_name = role_name.trim();
    if !is_valid_role_name(role_name) {
        return Err(AccessError::InvalidRole(role_name.to_string()));
    }
    if find_role(db, role_name).await?.is_some() {
        return Err(AccessError::RoleExists(role_name.to_string()));
    }

    let conn = db.connect()?;
    conn.execute(
        "INSERT INTO roles (role_name) VALUES (?)",
        params![role_name],
    )
    .await?;
    info!(role = %role_name, "Created role.");
    Ok(role_name.to_string())
}

/// Creates a role unless it already exists, returning the stored spelling.
pub async fn ensure_role(db: &Database, role_name: &str) -> Result<String, AccessError> {
    match find_role(db, role_name).await? {
        Some(existing) => Ok(existing),
        None => create_role(db, role_name).await,
    }
}

/// Lists all role names in alphabetical order.
pub async fn list_roles(db: &Database) -> Result<Vec<String>, AccessError> {
    let conn = db.connect()?;
    let mut rows = conn
        .query("SELECT role_name FROM roles ORDER BY role_name ASC", ())
        .await?;

    let mut roles = Vec::new();
    while let Some(row) = rows.next().await? {
        roles.push(row.get(0)?);
    }
    Ok(roles)
}

/// Loads a user together with their password hash.
async fn find_user_with_hash(
    db: &Database,
    username: &str,
) -> Result<Option<(User, String)>, AccessError> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "SELECT username, role, created_at, password_hash FROM users WHERE username = ?",
            params![username],
        )
        .await?;

    match rows.next().await? {
        Some(row) => {
            let user = User::try_from(&row)?;
            let password_hash: String = row.get(3)?;
            Ok(Some((user, password_hash)))
        }
        None => Ok(None),
    }
}

/// Finds a user by username.
pub async fn find_user(db: &Database, username: &str) -> Result<Option<User>, AccessError> {
    Ok(find_user_with_hash(db, username).await?.map(|(user, _)| user))
}

/// Creates a user under an existing role.
///
/// The role is matched case-insensitively and stored with its canonical spelling.
pub async fn create_user(
    db: &Database,
    username: &str,
    password: &str,
    role: &str,
    cost: u32,
) -> Result<User, AccessError> {
    let username = username.trim();
    if username.is_empty() || username.contains(':') {
        return Err(AccessError::InvalidUsername(username.to_string()));
    }
    let role = find_role(db, role)
        .await?
        .ok_or_else(|| AccessError::UnknownRole(role.to_string()))?;
    if find_user(db, username).await?.is_some() {
        return Err(AccessError::UserExists(username.to_string()));
    }

    let password_hash = hash_password(password, cost).await?;

    let conn = db.connect()?;
    conn.execute(
        "INSERT INTO users (username, password_hash, role) VALUES (?, ?, ?)",
        params![username, password_hash, role.clone()],
    )
    .await?;
    info!(username = %username, role = %role, "Created user.");

    find_user(db, username)
        .await?
        .ok_or_else(|| AccessError::DataIntegrity(format!("User '{username}' vanished after insert")))
}

/// Checks a username/password pair and returns the matching user.
///
/// Unknown users and wrong passwords produce the same error.
pub async fn verify_credentials(
    db: &Database,
    username: &str,
    password: &str,
) -> Result<User, AccessError> {
    let Some((user, password_hash)) = find_user_with_hash(db, username).await? else {
        warn!(username = %username, "Login attempt for unknown user.");
        return Err(AccessError::InvalidCredentials);
    };

    if verify_password(password, &password_hash).await? {
        Ok(user)
    } else {
        warn!(username = %username, "Login attempt with wrong password.");
        Err(AccessError::InvalidCredentials)
    }
}

/// Seeds both sentinel roles and the privileged bootstrap user.
///
/// Safe to call on every startup: an existing user of the same name is left untouched.
pub async fn ensure_default_admin(
    db: &Database,
    username: &str,
    password: &str,
    cost: u32,
) -> Result<User, AccessError> {
    ensure_role(db, PRIVILEGED_ROLE).await?;
    ensure_role(db, GENERAL_ROLE).await?;

    if let Some(existing) = find_user(db, username).await? {
        info!(username = %username, "Default admin already exists.");
        return Ok(existing);
    }
    create_user(db, username, password, PRIVILEGED_ROLE, cost).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    async fn setup_db() -> Database {
        let db = turso::Builder::new_local(":memory:").build().await.unwrap();
        initialize_access_schema(&db).await.unwrap();
        db
    }

    #[test]
    fn test_sentinels_ignore_case() {
        assert!(is_privileged("c-level"));
        assert!(is_privileged("C-LEVEL"));
        assert!(!is_privileged("HR"));
        assert!(is_general("General"));
        assert!(!is_general("generalist"));
    }

    #[tokio::test]
    async fn test_role_names_are_unique_regardless_of_case() {
        let db = setup_db().await;

        create_role(&db, "HR").await.unwrap();
        let duplicate = create_role(&db, "hr").await;

        assert!(matches!(duplicate, Err(AccessError::RoleExists(_))));
        assert_eq!(find_role(&db, "hR").await.unwrap().as_deref(), Some("HR"));
        assert_eq!(list_roles(&db).await.unwrap(), vec!["HR".to_string()]);
    }

    #[tokio::test]
    async fn test_role_names_that_escape_a_directory_are_rejected() {
        let db = setup_db().await;

        for name in ["..", ".", "../etc", "a\\b", "a/b", "", "  ", "hr.team", "-_-"] {
            let result = create_role(&db, name).await;
            assert!(
                matches!(result, Err(AccessError::InvalidRole(_))),
                "{name:?} should be rejected"
            );
        }

        assert_eq!(create_role(&db, "Sales Ops_2-EU").await.unwrap(), "Sales Ops_2-EU");
        assert_eq!(list_roles(&db).await.unwrap(), vec!["Sales Ops_2-EU".to_string()]);
    }

    #[tokio::test]
    async fn test_create_user_requires_existing_role() {
        let db = setup_db().await;

        let result = create_user(&db, "alice", "pw", "finance", TEST_COST).await;

        assert!(matches!(result, Err(AccessError::UnknownRole(_))));
        assert!(find_user(&db, "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_and_verify_user_flow() {
        // 1. Arrange
        let db = setup_db().await;
        create_role(&db, "finance").await.unwrap();

        // 2. Act: role spelling is canonicalized to the stored name.
        let user = create_user(&db, "alice", "pw", "FINANCE", TEST_COST)
            .await
            .unwrap();

        // 3. Assert
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, "finance");

        let verified = verify_credentials(&db, "alice", "pw").await.unwrap();
        assert_eq!(verified, user);
        assert!(matches!(
            verify_credentials(&db, "alice", "nope").await,
            Err(AccessError::InvalidCredentials)
        ));
        assert!(matches!(
            verify_credentials(&db, "bob", "pw").await,
            Err(AccessError::InvalidCredentials)
        ));

        let duplicate = create_user(&db, "alice", "other", "finance", TEST_COST).await;
        assert!(matches!(duplicate, Err(AccessError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_ensure_default_admin_is_idempotent() {
        let db = setup_db().await;

        let first = ensure_default_admin(&db, "admin", "admin123", TEST_COST)
            .await
            .unwrap();
        let second = ensure_default_admin(&db, "admin", "changed", TEST_COST)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.role, PRIVILEGED_ROLE);
        assert_eq!(
            list_roles(&db).await.unwrap(),
            vec![PRIVILEGED_ROLE.to_string(), GENERAL_ROLE.to_string()]
        );
        // The original password still works; the second call did not overwrite it.
        assert!(verify_credentials(&db, "admin", "admin123").await.is_ok());
    }
}
