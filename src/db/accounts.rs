use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use crate::db::content::push_page;
use crate::db::models::{AdminRow, AuditEntry, AuditRow, NewUser, UserChanges, UserRow};
use crate::db::store::{is_unique_violation, Store};
use crate::error::{AppError, Result};
use crate::types::STATUS_ACTIVE;

const USER_COLUMNS: &str = "SELECT id, username, mobile, email, password_hash, status, added_on, \
     last_login, login_attempts, account_locked_until FROM users";

impl Store {
    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<UserRow>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!("{USER_COLUMNS} ORDER BY id LIMIT ? OFFSET ?"))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn count_users(&self, active_only: bool) -> Result<i64> {
        let n: i64 = if active_only {
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE status = ?")
                .bind(STATUS_ACTIVE)
                .fetch_one(&self.pool)
                .await?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool)
                .await?
        };
        Ok(n)
    }

    pub async fn user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{USER_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{USER_COLUMNS} WHERE username = ?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// New users are created active. Fails with `BadRequest` on a taken username or email.
    pub async fn create_user(&self, user: &NewUser) -> Result<i64> {
        let res = sqlx::query(
            r#"
            INSERT INTO users (username, mobile, email, password_hash, status, added_on)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.mobile)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(STATUS_ACTIVE)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::BadRequest("Username or email already exists".to_string())
            } else {
                e.into()
            }
        })?;
        Ok(res.last_insert_rowid())
    }

    /// Applies only the fields that are set. Returns false when the user does not exist.
    pub async fn update_user(&self, id: i64, changes: &UserChanges) -> Result<bool> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE users SET id = id");
        if let Some(mobile) = &changes.mobile {
            qb.push(", mobile = ").push_bind(mobile.clone());
        }
        if let Some(email) = &changes.email {
            qb.push(", email = ").push_bind(email.clone());
        }
        if let Some(hash) = &changes.password_hash {
            qb.push(", password_hash = ").push_bind(hash.clone());
        }
        if let Some(status) = changes.status {
            qb.push(", status = ").push_bind(status);
        }
        qb.push(" WHERE id = ").push_bind(id);

        let res = qb.build().execute(&self.pool).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::BadRequest("Email already exists".to_string())
            } else {
                AppError::from(e)
            }
        })?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_user_status(&self, id: i64, status: i64) -> Result<bool> {
        self.update_user(id, &UserChanges { status: Some(status), ..Default::default() })
            .await
    }

    pub async fn delete_user(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Store the failed-attempt counter and, when the threshold was hit, the lock expiry.
    pub async fn record_login_failure(
        &self,
        id: i64,
        attempts: i64,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET login_attempts = ?, account_locked_until = ? WHERE id = ?")
            .bind(attempts)
            .bind(locked_until)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_login_success(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE users SET login_attempts = 0, account_locked_until = NULL, last_login = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Admins
    // -----------------------------------------------------------------------

    pub async fn count_admins(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admins")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn admin_by_username(&self, username: &str) -> Result<Option<AdminRow>> {
        let row = sqlx::query_as::<_, AdminRow>(
            "SELECT id, username, password_hash, status, created_at FROM admins WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn create_admin(&self, username: &str, password_hash: &str) -> Result<i64> {
        let res = sqlx::query(
            "INSERT INTO admins (username, password_hash, status, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(STATUS_ACTIVE)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    // -----------------------------------------------------------------------
    // Audit log
    // -----------------------------------------------------------------------

    pub async fn record_audit(&self, entry: &AuditEntry) -> Result<i64> {
        let res = sqlx::query(
            r#"
            INSERT INTO audit_log (
                actor_id, actor_role, action, entity_type, entity_id,
                old_value, new_value, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.actor_id)
        .bind(&entry.actor_role)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    /// Newest first.
    pub async fn list_audit(&self, actor_id: Option<i64>, limit: i64, offset: i64) -> Result<Vec<AuditRow>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, actor_id, actor_role, action, entity_type, entity_id, old_value, new_value, created_at \
             FROM audit_log",
        );
        if let Some(actor_id) = actor_id {
            qb.push(" WHERE actor_id = ").push_bind(actor_id);
        }
        qb.push(" ORDER BY created_at DESC, id DESC");
        push_page(&mut qb, Some(limit), offset);
        let rows = qb.build_query_as::<AuditRow>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn count_audit(&self, actor_id: Option<i64>) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM audit_log");
        if let Some(actor_id) = actor_id {
            qb.push(" WHERE actor_id = ").push_bind(actor_id);
        }
        let n: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(n)
    }
}
