use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, trace};

use crate::error::{AppError, AppResult};
use crate::models::scheduling::{CandidateSlot, DateRange};
use crate::models::user::UserProfile;
use crate::services::collaborators::AvailabilitySource;
use crate::services::schedule_utils::{self, UtcWindow, SLOT_STEP_MINUTES};

/// A resolved profile with its time zone parsed once per call.
#[derive(Debug, Clone)]
pub struct Participant {
    pub profile: UserProfile,
    pub tz: Tz,
}

impl Participant {
    pub fn resolve(profile: UserProfile) -> AppResult<Self> {
        let tz = schedule_utils::parse_time_zone(&profile.preferences.time_zone)?;
        Ok(Self { profile, tz })
    }

    pub fn user_id(&self) -> &str {
        &self.profile.user_id
    }

    pub fn working_window(&self, date: NaiveDate) -> AppResult<UtcWindow> {
        let prefs = &self.profile.preferences;
        schedule_utils::working_window_utc(
            &self.tz,
            date,
            prefs.working_hours_start,
            prefs.working_hours_end,
        )
    }

    /// True when the slot touches this participant's lunch break, compared
    /// in their local clock.
    pub fn overlaps_lunch(&self, slot: &CandidateSlot) -> bool {
        let Some((lunch_start, lunch_end)) = self.profile.preferences.lunch_break() else {
            return false;
        };
        let local_start = schedule_utils::local_clock(slot.start_time, &self.tz);
        let local_end = schedule_utils::local_clock(slot.end_time, &self.tz);
        schedule_utils::clock_ranges_overlap(local_start, local_end, lunch_start, lunch_end)
    }
}

/// Finds every slot of the requested length that all participants can
/// attend.
pub struct AvailabilityFinder {
    availability: Arc<dyn AvailabilitySource>,
    max_concurrent: usize,
}

impl AvailabilityFinder {
    pub fn new(availability: Arc<dyn AvailabilitySource>, max_concurrent: usize) -> Self {
        Self {
            availability,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Common working-hour window of all participants on `date`, or `None`
    /// when their hours do not meet.
    pub fn common_window(participants: &[Participant], date: NaiveDate) -> AppResult<Option<UtcWindow>> {
        let windows = participants
            .iter()
            .map(|participant| participant.working_window(date))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(schedule_utils::intersect(&windows))
    }

    /// Unfiltered candidates for one weekday, stepping through the common
    /// window in fixed increments.
    pub fn daily_candidates(
        participants: &[Participant],
        date: NaiveDate,
        duration_minutes: i64,
    ) -> AppResult<Vec<CandidateSlot>> {
        let Some(window) = Self::common_window(participants, date)? else {
            trace!(target: "app::finder", %date, "no common working hours");
            return Ok(Vec::new());
        };

        let participant_ids: Vec<String> = participants
            .iter()
            .map(|participant| participant.user_id().to_string())
            .collect();

        Ok(window
            .slot_starts(duration_minutes, SLOT_STEP_MINUTES)
            .into_iter()
            .map(|start| CandidateSlot::new(start, duration_minutes, participant_ids.clone()))
            .collect())
    }

    /// Unfiltered candidates for every weekday in the range, in chronological
    /// order.
    pub fn range_candidates(
        participants: &[Participant],
        duration_minutes: i64,
        range: &DateRange,
    ) -> AppResult<Vec<CandidateSlot>> {
        let mut candidates = Vec::new();
        for date in range.days() {
            if schedule_utils::is_weekend(date) {
                continue;
            }
            candidates.extend(Self::daily_candidates(participants, date, duration_minutes)?);
        }
        Ok(candidates)
    }

    /// Candidates in `range` that clear every participant's bookings and
    /// lunch break.
    ///
    /// Lunch breaks are checked first since they need no collaborator read.
    /// Every (candidate, participant) booking read then goes through one
    /// ordered stream, so at most `max_concurrent` reads are in flight and
    /// output order stays chronological.
    pub async fn find_windows(
        &self,
        participants: &[Participant],
        duration_minutes: i64,
        range: &DateRange,
    ) -> AppResult<Vec<CandidateSlot>> {
        if participants.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = Self::range_candidates(participants, duration_minutes, range)?;
        let generated = candidates.len();
        let outside_lunch: Vec<CandidateSlot> = candidates
            .into_iter()
            .filter(|candidate| {
                !participants
                    .iter()
                    .any(|participant| participant.overlaps_lunch(candidate))
            })
            .collect();

        let lookups = outside_lunch.iter().flat_map(|candidate| {
            participants
                .iter()
                .map(move |participant| (participant, candidate))
        });
        let booked: Vec<bool> = stream::iter(lookups)
            .map(|(participant, candidate)| async move {
                let bookings = self
                    .availability
                    .bookings_in_range(participant.user_id(), candidate.start_time, candidate.end_time)
                    .await?;
                Ok::<_, AppError>(!bookings.is_empty())
            })
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        let available: Vec<CandidateSlot> = outside_lunch
            .into_iter()
            .zip(booked.chunks(participants.len()))
            .filter(|(_, booked)| !booked.contains(&true))
            .map(|(candidate, _)| candidate)
            .collect();
        debug!(
            target: "app::finder",
            generated,
            available = available.len(),
            "availability windows filtered"
        );
        Ok(available)
    }
}
