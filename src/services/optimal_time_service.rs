use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::scheduling::{RankedSlot, SlotSearchRequest};
use crate::models::settings::EngineSettings;
use crate::services::availability_finder::{AvailabilityFinder, Participant};
use crate::services::collaborators::{AvailabilitySource, ProfileSource};
use crate::services::slot_scorer::SlotScorer;

/// Upper bound on recommendations returned per call.
pub const MAX_RECOMMENDATIONS: usize = 5;

/// Recommends meeting times for a group by intersecting working hours,
/// filtering out booked time and ranking what remains.
///
/// Holds no per-call state; concurrent calls share only the collaborators.
pub struct OptimalTimeService {
    profiles: Arc<dyn ProfileSource>,
    finder: AvailabilityFinder,
    scorer: SlotScorer,
    max_concurrent: usize,
}

impl OptimalTimeService {
    pub fn new(profiles: Arc<dyn ProfileSource>, availability: Arc<dyn AvailabilitySource>) -> Self {
        Self::with_settings(profiles, availability, &EngineSettings::default())
    }

    pub fn with_settings(
        profiles: Arc<dyn ProfileSource>,
        availability: Arc<dyn AvailabilitySource>,
        settings: &EngineSettings,
    ) -> Self {
        let max_concurrent = settings.max_concurrent_lookups.max(1);
        Self {
            profiles,
            finder: AvailabilityFinder::new(Arc::clone(&availability), max_concurrent),
            scorer: SlotScorer::new(availability, max_concurrent),
            max_concurrent,
        }
    }

    pub async fn find_optimal_slots(&self, request: SlotSearchRequest) -> AppResult<Vec<RankedSlot>> {
        request.validate()?;
        if !request.preferences.is_empty() {
            debug!(
                target: "app::engine",
                keys = ?request.preferences.keys().collect::<Vec<_>>(),
                "request preferences received"
            );
        }

        let participants = self.resolve_participants(&request.participant_ids).await?;
        let candidates = self
            .finder
            .find_windows(&participants, request.duration_minutes, &request.date_range)
            .await?;

        if candidates.is_empty() {
            info!(
                target: "app::engine",
                participants = participants.len(),
                start = %request.date_range.start,
                end = %request.date_range.end,
                "no common availability in range"
            );
            return Ok(Vec::new());
        }

        let candidate_count = candidates.len();
        let scored = self.scorer.evaluate_all(&participants, candidates).await?;

        let ranked = rank_slots(scored);
        info!(
            target: "app::engine",
            participants = participants.len(),
            candidates = candidate_count,
            returned = ranked.len(),
            best_score = ranked.first().map(|slot| slot.overall_score),
            "optimal slots computed"
        );
        Ok(ranked)
    }

    /// Resolves every distinct id before any window search. Unknown ids are
    /// dropped; an empty result is an error.
    async fn resolve_participants(&self, participant_ids: &[String]) -> AppResult<Vec<Participant>> {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = participant_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| seen.insert(*id))
            .collect();

        let profiles: Vec<_> = stream::iter(unique.iter())
            .map(|user_id| self.profiles.resolve_profile(user_id))
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        let mut participants = Vec::with_capacity(unique.len());
        for (user_id, profile) in unique.iter().zip(profiles) {
            match profile {
                Some(profile) => participants.push(Participant::resolve(profile)?),
                None => warn!(
                    target: "app::engine",
                    %user_id,
                    "participant not found; excluded from scheduling"
                ),
            }
        }

        if participants.is_empty() {
            return Err(AppError::invalid_participants(format!(
                "none of the {} requested participants could be resolved",
                unique.len()
            )));
        }
        Ok(participants)
    }
}

/// Orders by overall score, best first, keeping discovery order among ties,
/// then numbers the survivors from 1.
pub fn rank_slots(mut slots: Vec<RankedSlot>) -> Vec<RankedSlot> {
    slots.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(Ordering::Equal)
    });
    slots.truncate(MAX_RECOMMENDATIONS);
    for (index, slot) in slots.iter_mut().enumerate() {
        slot.rank = index + 1;
    }
    slots
}
