use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Timelike, Weekday};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::trace;

use crate::error::{AppError, AppResult};
use crate::models::scheduling::{
    CandidateSlot, ImpactLevel, ParticipantImpact, RankedSlot, ScoreComponents, ScoreWeighting,
    SlotReasoning,
};
use crate::services::availability_finder::Participant;
use crate::services::collaborators::AvailabilitySource;
use crate::services::schedule_utils;

const MAX_SCORE: f64 = 10.0;
const MIN_SCORE: f64 = 1.0;

const PRODUCTIVITY_BASE: f64 = 5.0;

const CONVENIENCE_BASE: f64 = 8.0;
const EARLIEST_CONVENIENT_HOUR: u32 = 8;
const LATEST_CONVENIENT_HOUR: u32 = 17;
const EARLY_PENALTY_PER_HOUR: f64 = 1.5;
const LATE_PENALTY_PER_HOUR: f64 = 1.0;
const QUIET_HOURS_PENALTY: f64 = 3.0;

const CONFLICT_BASE: f64 = 8.0;
const NEARBY_MEETING_PENALTY: f64 = 0.5;
/// Bookings starting or ending this close to a slot's start count as nearby.
pub const NEARBY_BUFFER_MINUTES: i64 = 30;

const PREFERENCE_BASE: f64 = 8.0;
const FRIDAY_BLOCK_PENALTY: f64 = 2.0;
const FRIDAY_MARKER: &str = "Friday";

/// Average of per-participant values, or `fallback` when there are none.
fn mean(values: impl Iterator<Item = f64>, fallback: f64) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        fallback
    } else {
        sum / count as f64
    }
}

/// Tier value of the last declared productive period containing the local
/// start hour, else the base score.
pub fn participant_productivity(participant: &Participant, slot: &CandidateSlot) -> f64 {
    let hour = schedule_utils::local_hour(slot.start_time, &participant.tz);
    participant
        .profile
        .preferences
        .productive_periods
        .iter()
        .filter(|period| period.contains_hour(hour))
        .last()
        .map(|period| period.tier_score())
        .unwrap_or(PRODUCTIVITY_BASE)
}

pub fn productivity_score(participants: &[Participant], slot: &CandidateSlot) -> f64 {
    mean(
        participants
            .iter()
            .map(|participant| participant_productivity(participant, slot)),
        PRODUCTIVITY_BASE,
    )
    .min(MAX_SCORE)
}

pub fn participant_convenience(participant: &Participant, slot: &CandidateSlot) -> f64 {
    let prefs = &participant.profile.preferences;
    let local_start = schedule_utils::local_datetime(slot.start_time, &participant.tz);
    let local_end = schedule_utils::local_clock(slot.end_time, &participant.tz);
    let hour = local_start.hour();

    let mut score = CONVENIENCE_BASE;
    if hour < EARLIEST_CONVENIENT_HOUR {
        score -= f64::from(EARLIEST_CONVENIENT_HOUR - hour) * EARLY_PENALTY_PER_HOUR;
    } else if hour > LATEST_CONVENIENT_HOUR {
        score -= f64::from(hour - LATEST_CONVENIENT_HOUR) * LATE_PENALTY_PER_HOUR;
    }

    if prefs
        .no_meetings_before
        .is_some_and(|limit| local_start.time() < limit)
    {
        score -= QUIET_HOURS_PENALTY;
    }
    if prefs.no_meetings_after.is_some_and(|limit| local_end > limit) {
        score -= QUIET_HOURS_PENALTY;
    }

    score.max(MIN_SCORE)
}

pub fn convenience_score(participants: &[Participant], slot: &CandidateSlot) -> f64 {
    mean(
        participants
            .iter()
            .map(|participant| participant_convenience(participant, slot)),
        CONVENIENCE_BASE,
    )
    .min(MAX_SCORE)
}

/// Friday is judged on the slot's UTC start date. Every meeting-free block
/// mentioning Friday costs the penalty again.
pub fn participant_preference(participant: &Participant, slot: &CandidateSlot) -> f64 {
    if slot.start_time.weekday() != Weekday::Fri {
        return PREFERENCE_BASE;
    }
    let friday_blocks = participant
        .profile
        .preferences
        .meeting_free_blocks
        .iter()
        .filter(|block| block.contains(FRIDAY_MARKER))
        .count();

    PREFERENCE_BASE - FRIDAY_BLOCK_PENALTY * friday_blocks as f64
}

pub fn preference_score(participants: &[Participant], slot: &CandidateSlot) -> f64 {
    mean(
        participants
            .iter()
            .map(|participant| participant_preference(participant, slot)),
        PREFERENCE_BASE,
    )
    .min(MAX_SCORE)
}

/// One shared value: every booking near the start, across all participants,
/// costs the same fixed amount.
pub fn conflict_risk_from_count(nearby_meetings: usize) -> f64 {
    (CONFLICT_BASE - NEARBY_MEETING_PENALTY * nearby_meetings as f64).max(MIN_SCORE)
}

pub fn explain(components: &ScoreComponents) -> String {
    let productivity = if components.productivity >= 8.5 {
        "Optimal productivity time for most participants"
    } else if components.productivity >= 7.0 {
        "Good productivity time for participants"
    } else {
        "Suboptimal productivity time"
    };

    let convenience = if components.convenience >= 8.0 {
        "Convenient time across time zones"
    } else {
        "Some timezone inconvenience"
    };

    let conflicts = if components.conflict_risk >= 8.0 {
        "Low conflict risk"
    } else {
        "Potential scheduling conflicts"
    };

    format!("{productivity}. {convenience}. {conflicts}.")
}

pub fn participant_impact(
    participants: &[Participant],
    slot: &CandidateSlot,
) -> BTreeMap<String, ParticipantImpact> {
    participants
        .iter()
        .map(|participant| {
            let local = schedule_utils::local_datetime(slot.start_time, &participant.tz);
            let impact = ParticipantImpact {
                local_time: local.format("%I:%M %p %Z").to_string(),
                impact: ImpactLevel::from_local_hour(local.hour()),
                timezone: participant.profile.preferences.time_zone.clone(),
            };
            (participant.user_id().to_string(), impact)
        })
        .collect()
}

pub fn reasoning(components: &ScoreComponents) -> SlotReasoning {
    let render = |score: f64| format!("Score: {score:.1}/10");
    SlotReasoning {
        productivity_analysis: render(components.productivity),
        convenience_analysis: render(components.convenience),
        conflict_analysis: render(components.conflict_risk),
        preference_analysis: render(components.preference),
        weighting: ScoreWeighting::default(),
    }
}

/// Scores surviving candidates. Only the conflict-risk component reads from
/// the availability collaborator.
pub struct SlotScorer {
    availability: Arc<dyn AvailabilitySource>,
    max_concurrent: usize,
}

impl SlotScorer {
    pub fn new(availability: Arc<dyn AvailabilitySource>, max_concurrent: usize) -> Self {
        Self {
            availability,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Bookings within the buffer of each slot's start, summed across
    /// participants, in slot order. All reads share one in-flight limit.
    pub async fn nearby_counts(
        &self,
        participants: &[Participant],
        slots: &[CandidateSlot],
    ) -> AppResult<Vec<usize>> {
        if participants.is_empty() {
            return Ok(vec![0; slots.len()]);
        }

        let lookups = slots.iter().flat_map(|slot| {
            participants
                .iter()
                .map(move |participant| (participant, slot))
        });
        let counts: Vec<usize> = stream::iter(lookups)
            .map(|(participant, slot)| async move {
                let nearby = self
                    .availability
                    .bookings_near(participant.user_id(), slot.start_time, NEARBY_BUFFER_MINUTES)
                    .await?;
                Ok::<_, AppError>(nearby.len())
            })
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        Ok(counts
            .chunks(participants.len())
            .map(|per_participant| per_participant.iter().sum())
            .collect())
    }

    pub async fn conflict_risk_score(
        &self,
        participants: &[Participant],
        slot: &CandidateSlot,
    ) -> AppResult<f64> {
        let counts = self
            .nearby_counts(participants, std::slice::from_ref(slot))
            .await?;
        Ok(conflict_risk_from_count(counts.into_iter().sum()))
    }

    /// Scored records for every candidate, in input order. Ranks stay 0
    /// until the ranker assigns them.
    pub async fn evaluate_all(
        &self,
        participants: &[Participant],
        slots: Vec<CandidateSlot>,
    ) -> AppResult<Vec<RankedSlot>> {
        let counts = self.nearby_counts(participants, &slots).await?;
        Ok(slots
            .into_iter()
            .zip(counts)
            .map(|(slot, nearby)| evaluate(participants, slot, nearby))
            .collect())
    }
}

/// Full scored record for one candidate given its nearby-booking count.
pub fn evaluate(participants: &[Participant], slot: CandidateSlot, nearby_meetings: usize) -> RankedSlot {
    let components = ScoreComponents {
        productivity: productivity_score(participants, &slot),
        convenience: convenience_score(participants, &slot),
        conflict_risk: conflict_risk_from_count(nearby_meetings),
        preference: preference_score(participants, &slot),
    };
    let overall = components.overall();
    trace!(
        target: "app::scorer",
        start = %slot.start_time,
        overall,
        "candidate scored"
    );

    RankedSlot {
        rank: 0,
        overall_score: overall,
        productivity_score: components.productivity,
        convenience_score: components.convenience,
        conflict_risk_score: components.conflict_risk,
        preference_score: components.preference,
        explanation: explain(&components),
        participant_impact: participant_impact(participants, &slot),
        reasoning: reasoning(&components),
        slot,
    }
}
