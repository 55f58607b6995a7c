//! Read-only views the slot engine needs of user profiles and calendars.
//!
//! The engine only ever talks to these traits. Storage-backed
//! implementations live in `user_service` and `calendar_service`;
//! [`InMemoryDirectory`] serves tests and embedders that already hold the
//! data in memory.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::models::meeting::BookedInterval;
use crate::models::user::UserProfile;

#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// `Ok(None)` when the id is unknown; `Err` only when the source itself
    /// failed.
    async fn resolve_profile(&self, user_id: &str) -> AppResult<Option<UserProfile>>;
}

#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    /// Bookings of `user_id` overlapping `[start, end)`.
    async fn bookings_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<BookedInterval>>;

    /// Bookings of `user_id` overlapping `instant ± buffer_minutes`.
    async fn bookings_near(
        &self,
        user_id: &str,
        instant: DateTime<Utc>,
        buffer_minutes: i64,
    ) -> AppResult<Vec<BookedInterval>> {
        let buffer = Duration::minutes(buffer_minutes);
        self.bookings_in_range(user_id, instant - buffer, instant + buffer)
            .await
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    profiles: RwLock<HashMap<String, UserProfile>>,
    bookings: RwLock<Vec<BookedInterval>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = UserProfile>) -> Self {
        let directory = Self::new();
        for profile in profiles {
            directory.insert_profile(profile);
        }
        directory
    }

    /// Writes go through even if a reader panicked while holding the lock;
    /// the map and list hold plain values and stay consistent.
    pub fn insert_profile(&self, profile: UserProfile) {
        let mut guard = self.profiles.write().unwrap_or_else(|poisoned| {
            warn!(target: "app::collaborator", "profile map lock poisoned; recovering");
            PoisonError::into_inner(poisoned)
        });
        guard.insert(profile.user_id.clone(), profile);
    }

    pub fn add_booking(&self, booking: BookedInterval) {
        let mut guard = self.bookings.write().unwrap_or_else(|poisoned| {
            warn!(target: "app::collaborator", "booking list lock poisoned; recovering");
            PoisonError::into_inner(poisoned)
        });
        guard.push(booking);
    }
}

#[async_trait]
impl ProfileSource for InMemoryDirectory {
    async fn resolve_profile(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        let guard = self
            .profiles
            .read()
            .map_err(|_| AppError::collaborator("profiles", "profile map lock poisoned"))?;
        Ok(guard.get(user_id).cloned())
    }
}

#[async_trait]
impl AvailabilitySource for InMemoryDirectory {
    async fn bookings_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<BookedInterval>> {
        let guard = self
            .bookings
            .read()
            .map_err(|_| AppError::collaborator("availability", "booking list lock poisoned"))?;
        let mut matches: Vec<BookedInterval> = guard
            .iter()
            .filter(|booking| booking.user_id == user_id && booking.overlaps(start, end))
            .cloned()
            .collect();
        matches.sort_by_key(|booking| booking.start_time);
        Ok(matches)
    }
}
