use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;
use crate::models::user::{UserPreferences, UserProfile};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub department: String,
    pub manager_id: Option<String>,
    pub preferences_json: String,
    pub is_active: bool,
    pub created_at: String,
}

impl TryFrom<&Row<'_>> for UserRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            role: row.get("role")?,
            department: row.get("department")?,
            manager_id: row.get("manager_id")?,
            preferences_json: row.get("preferences_json")?,
            is_active: row.get::<_, i64>("is_active")? != 0,
            created_at: row.get("created_at")?,
        })
    }
}

impl UserRow {
    pub fn from_profile(profile: &UserProfile) -> AppResult<Self> {
        Ok(Self {
            user_id: profile.user_id.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            role: profile.role.clone(),
            department: profile.department.clone(),
            manager_id: profile.manager_id.clone(),
            preferences_json: serde_json::to_string(&profile.preferences)?,
            is_active: profile.is_active,
            created_at: profile.created_at.clone(),
        })
    }

    /// A row whose preferences no longer parse is surfaced as an error so
    /// callers never schedule against guessed working hours.
    pub fn into_profile(self) -> AppResult<UserProfile> {
        let preferences: UserPreferences = serde_json::from_str(&self.preferences_json)?;
        Ok(UserProfile {
            user_id: self.user_id,
            name: self.name,
            email: self.email,
            role: self.role,
            department: self.department,
            manager_id: self.manager_id,
            preferences,
            is_active: self.is_active,
            created_at: self.created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "user_id, name, email, role, department, manager_id, \
     preferences_json, is_active, created_at";

pub struct UserRepository;

impl UserRepository {
    pub fn upsert(conn: &Connection, row: &UserRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO users (
                    user_id, name, email, role, department, manager_id,
                    preferences_json, is_active, created_at
                ) VALUES (
                    :user_id, :name, :email, :role, :department, :manager_id,
                    :preferences_json, :is_active, :created_at
                )
                ON CONFLICT(user_id) DO UPDATE SET
                    name = excluded.name,
                    email = excluded.email,
                    role = excluded.role,
                    department = excluded.department,
                    manager_id = excluded.manager_id,
                    preferences_json = excluded.preferences_json,
                    is_active = excluded.is_active
            "#,
            named_params! {
                ":user_id": row.user_id,
                ":name": row.name,
                ":email": row.email,
                ":role": row.role,
                ":department": row.department,
                ":manager_id": row.manager_id,
                ":preferences_json": row.preferences_json,
                ":is_active": row.is_active as i64,
                ":created_at": row.created_at,
            },
        )?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, user_id: &str) -> AppResult<Option<UserRow>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM users WHERE user_id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt
            .query_row([user_id], |row| UserRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list(conn: &Connection) -> AppResult<Vec<UserRow>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM users ORDER BY user_id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| UserRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_by_department(conn: &Connection, department: &str) -> AppResult<Vec<UserRow>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM users \
             WHERE department = ?1 COLLATE NOCASE ORDER BY user_id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([department], |row| UserRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_preferences(
        conn: &Connection,
        user_id: &str,
        preferences_json: &str,
    ) -> AppResult<usize> {
        let updated = conn.execute(
            "UPDATE users SET preferences_json = ?1 WHERE user_id = ?2",
            [preferences_json, user_id],
        )?;
        Ok(updated)
    }

    pub fn delete(conn: &Connection, user_id: &str) -> AppResult<usize> {
        let deleted = conn.execute("DELETE FROM users WHERE user_id = ?1", [user_id])?;
        Ok(deleted)
    }
}
