use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{AppError, AppResult};

pub const PRODUCTIVITY_WEIGHT: f64 = 0.4;
pub const CONVENIENCE_WEIGHT: f64 = 0.3;
pub const CONFLICT_RISK_WEIGHT: f64 = 0.2;
pub const PREFERENCE_WEIGHT: f64 = 0.1;

/// Inclusive range of calendar dates, interpreted in UTC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Every date from `start` to `end` inclusive, ascending. Empty when
    /// the range is inverted.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotSearchRequest {
    pub participant_ids: Vec<String>,
    pub duration_minutes: i64,
    pub date_range: DateRange,
    /// Accepted and logged; no ranking rule reads it.
    #[serde(default)]
    pub preferences: JsonMap<String, JsonValue>,
}

impl SlotSearchRequest {
    pub fn new(participant_ids: Vec<String>, duration_minutes: i64, date_range: DateRange) -> Self {
        Self {
            participant_ids,
            duration_minutes,
            date_range,
            preferences: JsonMap::new(),
        }
    }

    /// Rejects requests no search could satisfy before any collaborator is
    /// consulted.
    pub fn validate(&self) -> AppResult<()> {
        if self.participant_ids.is_empty() {
            return Err(AppError::validation("at least one participant is required"));
        }
        if self
            .participant_ids
            .iter()
            .any(|id| id.trim().is_empty())
        {
            return Err(AppError::validation("participant ids must not be blank"));
        }
        if self.duration_minutes <= 0 {
            return Err(AppError::validation(format!(
                "duration must be positive, got {} minutes",
                self.duration_minutes
            )));
        }
        if self.date_range.end < self.date_range.start {
            return Err(AppError::validation(format!(
                "date range is inverted: {} is after {}",
                self.date_range.start, self.date_range.end
            )));
        }
        Ok(())
    }
}

/// A tentative `[start_time, end_time)` interval every listed participant
/// can attend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub participant_ids: Vec<String>,
}

impl CandidateSlot {
    pub fn new(start_time: DateTime<Utc>, duration_minutes: i64, participant_ids: Vec<String>) -> Self {
        Self {
            start_time,
            end_time: start_time + Duration::minutes(duration_minutes),
            duration_minutes,
            participant_ids,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreComponents {
    pub productivity: f64,
    pub convenience: f64,
    pub conflict_risk: f64,
    pub preference: f64,
}

impl ScoreComponents {
    pub fn overall(&self) -> f64 {
        self.productivity * PRODUCTIVITY_WEIGHT
            + self.convenience * CONVENIENCE_WEIGHT
            + self.conflict_risk * CONFLICT_RISK_WEIGHT
            + self.preference * PREFERENCE_WEIGHT
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ImpactLevel {
    /// Bucket for a local start hour; the first matching band wins.
    pub fn from_local_hour(hour: u32) -> Self {
        if (9..=17).contains(&hour) {
            ImpactLevel::Excellent
        } else if (8..=18).contains(&hour) {
            ImpactLevel::Good
        } else if (7..=19).contains(&hour) {
            ImpactLevel::Fair
        } else {
            ImpactLevel::Poor
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantImpact {
    pub local_time: String,
    pub impact: ImpactLevel,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreWeighting {
    pub productivity: String,
    pub convenience: String,
    pub conflict_risk: String,
    pub preferences: String,
}

impl Default for ScoreWeighting {
    fn default() -> Self {
        let pct = |weight: f64| format!("{:.0}%", weight * 100.0);
        Self {
            productivity: pct(PRODUCTIVITY_WEIGHT),
            convenience: pct(CONVENIENCE_WEIGHT),
            conflict_risk: pct(CONFLICT_RISK_WEIGHT),
            preferences: pct(PREFERENCE_WEIGHT),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotReasoning {
    pub productivity_analysis: String,
    pub convenience_analysis: String,
    pub conflict_analysis: String,
    pub preference_analysis: String,
    pub weighting: ScoreWeighting,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedSlot {
    pub rank: usize,
    pub slot: CandidateSlot,
    pub overall_score: f64,
    pub productivity_score: f64,
    pub convenience_score: f64,
    pub conflict_risk_score: f64,
    pub preference_score: f64,
    pub explanation: String,
    pub participant_impact: BTreeMap<String, ParticipantImpact>,
    pub reasoning: SlotReasoning,
}

impl RankedSlot {
    pub fn components(&self) -> ScoreComponents {
        ScoreComponents {
            productivity: self.productivity_score,
            convenience: self.convenience_score,
            conflict_risk: self.conflict_risk_score,
            preference: self.preference_score,
        }
    }
}
