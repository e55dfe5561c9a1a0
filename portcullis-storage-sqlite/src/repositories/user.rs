use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{
    Error, Role, RoleId, User, UserAccess, UserId,
    error::{StorageError, ValidationError, utilities::StorageResultExt},
    repositories::UserRepository,
};
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SqliteUser {
    pub id: i64,
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<SqliteUser> for User {
    type Error = Error;

    fn try_from(row: SqliteUser) -> Result<Self, Self::Error> {
        let id = u64::try_from(row.id)
            .map_err(|_| StorageError::Database(format!("Invalid user id {}", row.id)))?;

        Ok(User {
            id: UserId::new(id),
            username: row.username,
            fullname: row.fullname,
            email: row.email,
            password_hash: row.password_hash,
            created_at: DateTime::from_timestamp(row.created_at, 0).unwrap_or_default(),
            updated_at: DateTime::from_timestamp(row.updated_at, 0).unwrap_or_default(),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteRole {
    id: i64,
    code: String,
    full_access: bool,
}

impl From<SqliteRole> for Role {
    fn from(row: SqliteRole) -> Self {
        Role {
            id: RoleId(row.id as u64),
            code: row.code,
            full_access: row.full_access,
        }
    }
}

/// A user to insert into the directory
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub fullname: String,
    pub email: String,
    /// Argon2 PHC string, see [`portcullis_core::crypto::hash_password`]
    pub password_hash: String,
}

impl NewUser {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            fullname: String::new(),
            email: String::new(),
            password_hash: password_hash.into(),
        }
    }

    pub fn with_fullname(mut self, fullname: impl Into<String>) -> Self {
        self.fullname = fullname.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }
}

/// Rows are keyed by `i64`; ids beyond that range cannot exist.
fn row_id(id: UserId) -> Option<i64> {
    i64::try_from(id.get()).ok()
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_user(&self, user: NewUser) -> Result<User, Error> {
        let now = Utc::now().timestamp();

        let row = sqlx::query_as::<_, SqliteUser>(
            r#"
            INSERT INTO users (username, fullname, email, password_hash, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.fullname)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::Storage(
                StorageError::Constraint(format!("Username {} is taken", user.username)),
            ),
            e => Error::Storage(StorageError::Database(e.to_string())),
        })?;

        row.try_into()
    }

    pub async fn update_password_hash(&self, id: UserId, password_hash: &str) -> Result<(), Error> {
        let id = row_id(id).ok_or(StorageError::NotFound)?;

        let result = sqlx::query("UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(password_hash)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_db_err()?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound.into());
        }
        Ok(())
    }

    pub async fn delete_user(&self, id: UserId) -> Result<(), Error> {
        let Some(id) = row_id(id) else {
            return Ok(());
        };

        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_db_err()?;

        Ok(())
    }

    pub async fn create_role(&self, code: &str, full_access: bool) -> Result<Role, Error> {
        if code.trim().is_empty() {
            return Err(ValidationError::MissingField("Role code is required".to_string()).into());
        }

        let row = sqlx::query_as::<_, SqliteRole>(
            "INSERT INTO roles (code, full_access) VALUES (?1, ?2) RETURNING id, code, full_access",
        )
        .bind(code)
        .bind(full_access)
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to create role")?;

        Ok(row.into())
    }

    /// Attach a permission code to a role, creating the permission if needed
    pub async fn grant_permission(&self, role_id: RoleId, code: &str) -> Result<(), Error> {
        if code.trim().is_empty() {
            return Err(
                ValidationError::MissingField("Permission code is required".to_string()).into(),
            );
        }

        let mut tx = self.pool.begin().await.map_db_err()?;

        sqlx::query("INSERT INTO permissions (code) VALUES (?1) ON CONFLICT(code) DO NOTHING")
            .bind(code)
            .execute(&mut *tx)
            .await
            .map_db_err_with_context("Failed to create permission")?;

        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            SELECT ?1, id FROM permissions WHERE code = ?2
            ON CONFLICT(role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(role_id.0 as i64)
        .bind(code)
        .execute(&mut *tx)
        .await
        .map_db_err_with_context("Failed to grant permission")?;

        tx.commit().await.map_db_err()?;
        Ok(())
    }

    pub async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> Result<(), Error> {
        let user_id = row_id(user_id).ok_or(StorageError::NotFound)?;

        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES (?1, ?2) ON CONFLICT(user_id, role_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id.0 as i64)
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to assign role")?;

        Ok(())
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, SqliteUser>("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error> {
        let Some(id) = row_id(id) else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, SqliteUser>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        row.map(User::try_from).transpose()
    }

    async fn find_access(&self, id: UserId) -> Result<Option<UserAccess>, Error> {
        let Some(key) = row_id(id) else {
            return Ok(None);
        };

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_db_err()?;
        if !exists {
            return Ok(None);
        }

        let roles = sqlx::query_as::<_, SqliteRole>(
            r#"
            SELECT r.id, r.code, r.full_access
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ?1
            ORDER BY r.id
            "#,
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_db_err_with_context("Failed to load roles")?;

        let grants: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT rp.role_id, p.code
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            JOIN user_roles ur ON ur.role_id = rp.role_id
            WHERE ur.user_id = ?1
            "#,
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_db_err_with_context("Failed to load permissions")?;

        let mut access = roles
            .into_iter()
            .fold(UserAccess::new(id), |access, role| access.with_role(role.into()));
        for (role_id, code) in grants {
            access = access.with_permission(RoleId(role_id as u64), code);
        }

        Ok(Some(access))
    }
}
