//! User directory: lookups and per-department PPR/APR resolution.
//!
//! Resolution degrades, never fails: a department with no primary on
//! file gets the configured fallback assignee so step generation can
//! always complete.

use crate::error::{Error, Result};
use crate::model::{Assignment, User, UserId};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    display_name: String,
    department: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId(row.id),
            email: row.email,
            display_name: row.display_name,
            department: row.department,
        }
    }
}

impl super::Db {
    /// Get a user by id.
    pub async fn get_user(&self, id: UserId) -> Result<User> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, display_name, department FROM users WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::from)
            .ok_or_else(|| Error::NotFound(format!("user {id}")))
    }

    /// Add a user to the directory.
    pub async fn add_user(
        &self,
        email: &str,
        display_name: &str,
        department: &str,
        role: &str,
    ) -> Result<User> {
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (email, display_name, department, role)
             VALUES ($1, $2, $3, $4)
             RETURNING id, email, display_name, department",
        )
        .bind(email)
        .bind(display_name)
        .bind(department)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(dbe) if dbe.is_unique_violation() => {
                Error::DuplicateKey(format!("user email '{email}'"))
            }
            _ => Error::Database(e),
        })?;
        Ok(row.into())
    }

    /// Resolve PPR/APR assignment for a department.
    ///
    /// Picks the first active PPR-role user in the department (oldest id
    /// wins, so resolution is deterministic), `fallback` when there is
    /// none. The APR slot stays empty rather than falling back.
    pub async fn resolve_assignment(
        &self,
        department: &str,
        fallback: UserId,
    ) -> Result<Assignment> {
        let ppr: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM users
             WHERE department = $1 AND role = 'PPR' AND is_active
             ORDER BY id ASC LIMIT 1",
        )
        .bind(department)
        .fetch_optional(&self.pool)
        .await?;

        let apr: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM users
             WHERE department = $1 AND role = 'APR' AND is_active
             ORDER BY id ASC LIMIT 1",
        )
        .bind(department)
        .fetch_optional(&self.pool)
        .await?;

        Ok(Assignment {
            ppr: ppr.map(|(id,)| UserId(id)).unwrap_or(fallback),
            apr: apr.map(|(id,)| UserId(id)),
        })
    }
}
