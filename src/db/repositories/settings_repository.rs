use std::collections::HashMap;

use rusqlite::{named_params, params_from_iter, Connection};

use crate::error::AppResult;

/// Raw engine setting overrides. Values are stored as text and parsed by
/// the settings service, which owns the defaults.
pub struct SettingsRepository;

impl SettingsRepository {
    pub fn load_all(conn: &Connection) -> AppResult<HashMap<String, String>> {
        let mut stmt = conn.prepare("SELECT key, value FROM app_settings")?;
        let stored = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(stored)
    }

    /// Writes every override; callers wrap this in a transaction so a batch
    /// lands whole or not at all.
    pub fn store(conn: &Connection, entries: &[(&str, String)]) -> AppResult<usize> {
        let mut stmt = conn.prepare_cached(
            r#"
                INSERT INTO app_settings (key, value)
                VALUES (:key, :value)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = CURRENT_TIMESTAMP
            "#,
        )?;
        for (key, value) in entries {
            stmt.execute(named_params! {":key": key, ":value": value})?;
        }
        Ok(entries.len())
    }

    pub fn remove(conn: &Connection, keys: &[&str]) -> AppResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; keys.len()].join(", ");
        let removed = conn.execute(
            &format!("DELETE FROM app_settings WHERE key IN ({placeholders})"),
            params_from_iter(keys.iter()),
        )?;
        Ok(removed)
    }
}
