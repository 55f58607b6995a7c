use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::meeting::BookedInterval;
use crate::models::scheduling::{DateRange, RankedSlot, SlotSearchRequest};
use crate::services::collaborators::AvailabilitySource;
use crate::services::optimal_time_service::OptimalTimeService;
use crate::services::schedule_utils::{format_utc, parse_date, parse_datetime};

/// Tool schemas for scheduling operations, in the function-calling format.

pub fn find_optimal_slots_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "participants": {
                "type": "array",
                "items": {"type": "string"},
                "minItems": 1,
                "description": "User ids of everyone who must attend (required)"
            },
            "duration": {
                "type": "integer",
                "minimum": 1,
                "description": "Meeting length in minutes (required)"
            },
            "date_range": {
                "type": "array",
                "items": {"type": "string"},
                "minItems": 2,
                "maxItems": 2,
                "description": "[start, end] as YYYY-MM-DD or RFC 3339; both ends inclusive (required)"
            },
            "preferences": {
                "type": "object",
                "description": "Optional free-form meeting preferences"
            }
        },
        "required": ["participants", "duration", "date_range"]
    })
}

pub fn detect_scheduling_conflicts_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "user_id": {
                "type": "string",
                "description": "User to check (required)"
            },
            "start_time": {
                "type": "string",
                "format": "date-time",
                "description": "Range start, RFC 3339 (required)"
            },
            "end_time": {
                "type": "string",
                "format": "date-time",
                "description": "Range end, RFC 3339 (required)"
            }
        },
        "required": ["user_id", "start_time", "end_time"]
    })
}

#[derive(Debug, Deserialize)]
struct FindOptimalSlotsParams {
    participants: Vec<String>,
    duration: i64,
    date_range: Vec<String>,
    #[serde(default)]
    preferences: Option<JsonMap<String, JsonValue>>,
}

#[derive(Debug, Deserialize)]
struct DetectConflictsParams {
    user_id: String,
    start_time: String,
    end_time: String,
}

fn extract_params<T: for<'de> Deserialize<'de>>(args: &JsonValue) -> AppResult<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| AppError::validation(format!("Failed to parse tool parameters: {}", e)))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn format_slot(slot: &RankedSlot) -> AppResult<JsonValue> {
    Ok(json!({
        "rank": slot.rank,
        "start_time": format_utc(slot.slot.start_time),
        "end_time": format_utc(slot.slot.end_time),
        "duration_minutes": slot.slot.duration_minutes,
        "overall_score": round2(slot.overall_score),
        "score_breakdown": {
            "productivity": round2(slot.productivity_score),
            "convenience": round2(slot.convenience_score),
            "conflict_risk": round2(slot.conflict_risk_score),
            "preferences": round2(slot.preference_score)
        },
        "explanation": slot.explanation,
        "participant_impact": serde_json::to_value(&slot.participant_impact)?,
        "reasoning": serde_json::to_value(&slot.reasoning)?
    }))
}

fn format_conflict(booking: &BookedInterval) -> JsonValue {
    json!({
        "meeting_id": booking.meeting_id,
        "start_time": format_utc(booking.start_time),
        "end_time": format_utc(booking.end_time),
        "conflict_type": "overlap",
        "severity": "high"
    })
}

/// Ranked meeting times for a group.
///
/// Bad arguments and unresolvable participant lists surface as `Err`; an
/// empty search is a normal response with `success: false` and hints.
pub async fn find_optimal_slots_tool(
    service: Arc<OptimalTimeService>,
    args: JsonValue,
) -> AppResult<JsonValue> {
    debug!(target: "app::tools", "Finding optimal slots with args: {}", args);

    let params: FindOptimalSlotsParams = extract_params(&args)?;
    let [start, end] = params.date_range.as_slice() else {
        return Err(AppError::validation(format!(
            "date_range must hold exactly two dates, got {}",
            params.date_range.len()
        )));
    };
    let date_range = DateRange::new(parse_date(start)?, parse_date(end)?);

    let mut request =
        SlotSearchRequest::new(params.participants.clone(), params.duration, date_range);
    request.preferences = params.preferences.unwrap_or_default();

    let slots = service.find_optimal_slots(request).await?;

    if slots.is_empty() {
        return Ok(json!({
            "success": false,
            "message": "No suitable time slots found for all participants",
            "optimal_slots": [],
            "suggestions": [
                "Try extending the date range",
                "Consider reducing meeting duration",
                "Check if all participants are available during the specified period"
            ]
        }));
    }

    let formatted = slots
        .iter()
        .map(format_slot)
        .collect::<AppResult<Vec<_>>>()?;
    let best = &slots[0];

    Ok(json!({
        "success": true,
        "optimal_slots": formatted,
        "analysis_summary": {
            "participants_analyzed": params.participants.len(),
            "duration_requested": params.duration,
            "date_range": params.date_range,
            "slots_found": slots.len(),
            "best_score": round2(best.overall_score)
        },
        "recommendations": [
            format!("Best option: {}", best.explanation),
            "Consider the participant impact when making final decision",
            "Higher scores indicate better overall fit for all participants"
        ]
    }))
}

/// Bookings of one user overlapping a proposed time range.
pub async fn detect_scheduling_conflicts_tool(
    availability: Arc<dyn AvailabilitySource>,
    args: JsonValue,
) -> AppResult<JsonValue> {
    debug!(target: "app::tools", "Detecting conflicts with args: {}", args);

    let params: DetectConflictsParams = extract_params(&args)?;
    if params.user_id.trim().is_empty() {
        return Err(AppError::validation("user_id must not be blank"));
    }
    let start = parse_datetime(&params.start_time)?;
    let end = parse_datetime(&params.end_time)?;
    if end <= start {
        return Err(AppError::validation("end_time must be after start_time"));
    }

    let bookings = availability
        .bookings_in_range(params.user_id.trim(), start, end)
        .await?;
    let conflicts: Vec<JsonValue> = bookings.iter().map(format_conflict).collect();
    let recommendation = if conflicts.is_empty() {
        "No conflicts found - time slot is available".to_string()
    } else {
        format!(
            "Found {} conflicts - consider alternative times",
            conflicts.len()
        )
    };

    Ok(json!({
        "success": true,
        "user_id": params.user_id,
        "time_range": {
            "start": params.start_time,
            "end": params.end_time
        },
        "conflicts_found": conflicts.len(),
        "is_available": conflicts.is_empty(),
        "conflicts": conflicts,
        "recommendations": [recommendation]
    }))
}
