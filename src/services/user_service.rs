use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use tracing::{debug, info, warn};

use crate::db::repositories::user_repository::{UserRepository, UserRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::settings::DEFAULT_PROFILE_CACHE_CAPACITY;
use crate::models::user::{UserPreferences, UserProfile};
use crate::services::collaborators::ProfileSource;
use crate::services::schedule_utils;

/// SQLite-backed user directory with an invalidatable profile cache.
#[derive(Clone)]
pub struct UserService {
    db: DbPool,
    cache: Arc<Mutex<LruCache<String, UserProfile>>>,
}

impl UserService {
    pub fn new(db: DbPool) -> Self {
        Self::with_cache_capacity(db, DEFAULT_PROFILE_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(db: DbPool, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            db,
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Inserts or replaces a user. The time zone is checked up front so a
    /// stored profile can always be scheduled against.
    pub fn upsert_user(&self, mut profile: UserProfile) -> AppResult<UserProfile> {
        if profile.user_id.trim().is_empty() {
            return Err(AppError::validation("user id must not be blank"));
        }
        schedule_utils::parse_time_zone(&profile.preferences.time_zone)?;
        if profile.created_at.is_empty() {
            profile.created_at = Utc::now().to_rfc3339();
        }

        let row = UserRow::from_profile(&profile)?;
        self.db
            .with_connection(|conn| UserRepository::upsert(conn, &row))?;
        self.invalidate(&profile.user_id);

        info!(target: "app::users", user_id = %profile.user_id, "user stored");
        Ok(profile)
    }

    pub fn import_users(&self, profiles: Vec<UserProfile>) -> AppResult<usize> {
        for profile in &profiles {
            schedule_utils::parse_time_zone(&profile.preferences.time_zone)?;
        }
        let now = Utc::now().to_rfc3339();
        let rows = profiles
            .into_iter()
            .map(|mut profile| {
                if profile.created_at.is_empty() {
                    profile.created_at = now.clone();
                }
                UserRow::from_profile(&profile)
            })
            .collect::<AppResult<Vec<_>>>()?;

        let count = self.db.with_transaction(|conn| {
            for row in &rows {
                UserRepository::upsert(conn, row)?;
            }
            Ok(rows.len())
        })?;
        self.clear_cache();

        info!(target: "app::users", count, "users imported");
        Ok(count)
    }

    pub fn get_user(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        if let Some(profile) = self.cached(user_id)? {
            debug!(target: "app::users", %user_id, "profile cache hit");
            return Ok(Some(profile));
        }

        let row = self
            .db
            .with_connection(|conn| UserRepository::find_by_id(conn, user_id))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let profile = row.into_profile()?;
        self.remember(profile.clone())?;
        Ok(Some(profile))
    }

    pub fn list_users(&self) -> AppResult<Vec<UserProfile>> {
        self.db
            .with_connection(|conn| UserRepository::list(conn))?
            .into_iter()
            .map(UserRow::into_profile)
            .collect()
    }

    pub fn users_by_department(&self, department: &str) -> AppResult<Vec<UserProfile>> {
        self.db
            .with_connection(|conn| UserRepository::list_by_department(conn, department))?
            .into_iter()
            .map(UserRow::into_profile)
            .collect()
    }

    pub fn update_preferences(
        &self,
        user_id: &str,
        preferences: UserPreferences,
    ) -> AppResult<UserProfile> {
        schedule_utils::parse_time_zone(&preferences.time_zone)?;
        let payload = serde_json::to_string(&preferences)?;
        let updated = self
            .db
            .with_connection(|conn| UserRepository::update_preferences(conn, user_id, &payload))?;
        if updated == 0 {
            warn!(target: "app::users", %user_id, "preferences update for unknown user");
            return Err(AppError::not_found());
        }

        self.invalidate(user_id);
        self.get_user(user_id)?.ok_or_else(AppError::not_found)
    }

    pub fn delete_user(&self, user_id: &str) -> AppResult<bool> {
        let deleted = self
            .db
            .with_connection(|conn| UserRepository::delete(conn, user_id))?;
        self.invalidate(user_id);
        Ok(deleted > 0)
    }

    /// Eviction must not be skipped, or a stale profile would keep being
    /// served; a poisoned cache lock is recovered rather than ignored.
    pub fn invalidate(&self, user_id: &str) {
        self.cache_for_eviction().pop(user_id);
    }

    pub fn clear_cache(&self) {
        self.cache_for_eviction().clear();
    }

    fn cache_for_eviction(&self) -> MutexGuard<'_, LruCache<String, UserProfile>> {
        self.cache.lock().unwrap_or_else(|poisoned| {
            warn!(target: "app::users", "profile cache lock poisoned; recovering for eviction");
            PoisonError::into_inner(poisoned)
        })
    }

    fn cached(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| AppError::collaborator("profiles", "profile cache lock poisoned"))?;
        Ok(cache.get(user_id).cloned())
    }

    fn remember(&self, profile: UserProfile) -> AppResult<()> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| AppError::collaborator("profiles", "profile cache lock poisoned"))?;
        cache.put(profile.user_id.clone(), profile);
        Ok(())
    }
}

#[async_trait]
impl ProfileSource for UserService {
    async fn resolve_profile(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        let service = self.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || service.get_user(&user_id))
            .await
            .map_err(|err| AppError::collaborator("profiles", format!("lookup task failed: {err}")))?
    }
}
