use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

use tracing::{info, warn};

use crate::db::repositories::settings_repository::SettingsRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::settings::{EngineSettings, EngineSettingsUpdate};

const KEY_MAX_CONCURRENT_LOOKUPS: &str = "max_concurrent_lookups";
const KEY_PROFILE_CACHE_CAPACITY: &str = "profile_cache_capacity";

const MAX_CONCURRENT_LOOKUPS_LIMIT: usize = 256;

pub struct SettingsService {
    db: DbPool,
    cache: RwLock<Option<EngineSettings>>,
}

impl SettingsService {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            cache: RwLock::new(None),
        }
    }

    pub fn get(&self) -> AppResult<EngineSettings> {
        if let Ok(guard) = self.cache.read() {
            if let Some(settings) = guard.as_ref() {
                return Ok(settings.clone());
            }
        }

        let settings = self.load_settings_from_db()?;
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(settings.clone());
        }
        Ok(settings)
    }

    pub fn update(&self, input: EngineSettingsUpdate) -> AppResult<EngineSettings> {
        let mut current = self.get()?;
        let mut changes: Vec<(&str, String)> = Vec::new();

        if let Some(limit) = input.max_concurrent_lookups {
            if limit == 0 || limit > MAX_CONCURRENT_LOOKUPS_LIMIT {
                return Err(AppError::validation(format!(
                    "max_concurrent_lookups must be between 1 and {MAX_CONCURRENT_LOOKUPS_LIMIT}"
                )));
            }
            current.max_concurrent_lookups = limit;
            changes.push((KEY_MAX_CONCURRENT_LOOKUPS, limit.to_string()));
        }

        if let Some(capacity) = input.profile_cache_capacity {
            if capacity == 0 {
                return Err(AppError::validation("profile_cache_capacity must be positive"));
            }
            current.profile_cache_capacity = capacity;
            changes.push((KEY_PROFILE_CACHE_CAPACITY, capacity.to_string()));
        }

        if changes.is_empty() {
            return Ok(current);
        }

        self.db
            .with_transaction(|conn| SettingsRepository::store(conn, &changes))?;

        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(current.clone());
        }

        info!(target: "app::settings", updated = changes.len(), "engine settings updated");
        Ok(current)
    }

    /// Drops stored overrides so defaults apply again.
    pub fn reset(&self) -> AppResult<EngineSettings> {
        self.db.with_transaction(|conn| {
            SettingsRepository::remove(conn, &[KEY_MAX_CONCURRENT_LOOKUPS, KEY_PROFILE_CACHE_CAPACITY])
        })?;

        if let Ok(mut guard) = self.cache.write() {
            *guard = None;
        }
        self.get()
    }

    fn load_settings_from_db(&self) -> AppResult<EngineSettings> {
        let stored = self.db.with_connection(SettingsRepository::load_all)?;
        let defaults = EngineSettings::default();

        Ok(EngineSettings {
            max_concurrent_lookups: parse_or_default(
                &stored,
                KEY_MAX_CONCURRENT_LOOKUPS,
                defaults.max_concurrent_lookups,
            ),
            profile_cache_capacity: parse_or_default(
                &stored,
                KEY_PROFILE_CACHE_CAPACITY,
                defaults.profile_cache_capacity,
            ),
        })
    }
}

fn parse_or_default<T: FromStr + Copy>(stored: &HashMap<String, String>, key: &str, default: T) -> T {
    match stored.get(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(target: "app::settings", %key, value = %raw, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}
