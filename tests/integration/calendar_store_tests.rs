use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use meeting_assistant_lib::db::DbPool;
use meeting_assistant_lib::error::{AppError, AppResult};
use meeting_assistant_lib::models::meeting::{
    MeetingCreateInput, MeetingRecord, MeetingStatus, MeetingType,
};
use meeting_assistant_lib::models::scheduling::{DateRange, SlotSearchRequest};
use meeting_assistant_lib::models::user::{UserPreferences, UserProfile};
use meeting_assistant_lib::services::calendar_service::CalendarService;
use meeting_assistant_lib::services::collaborators::{AvailabilitySource, ProfileSource};
use meeting_assistant_lib::services::optimal_time_service::OptimalTimeService;
use meeting_assistant_lib::services::user_service::UserService;
use tempfile::tempdir;

fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, h, m, 0).unwrap()
}

fn setup() -> (UserService, CalendarService, tempfile::TempDir) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("calendar.sqlite")).expect("db pool");
    (UserService::new(pool.clone()), CalendarService::new(pool), dir)
}

fn meeting_input(title: &str, participants: &[&str], start: DateTime<Utc>, end: DateTime<Utc>) -> MeetingCreateInput {
    MeetingCreateInput {
        title: title.to_string(),
        description: Some(format!("{title} notes")),
        participants: participants.iter().map(|p| p.to_string()).collect(),
        organizer: participants[0].to_string(),
        start_time: start,
        end_time: end,
        time_zone: "UTC".to_string(),
        meeting_type: MeetingType::Team,
        location: None,
        agenda: vec!["status".to_string()],
    }
}

fn profile(user_id: &str, zone: &str) -> UserProfile {
    UserProfile::new(
        user_id,
        user_id.to_uppercase(),
        UserPreferences::with_working_hours(
            zone,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        ),
    )
}

#[test]
fn create_and_fetch_meeting_round_trips() -> AppResult<()> {
    let (_users, calendar, _dir) = setup();

    let created = calendar.create_meeting(meeting_input(
        "Design review",
        &["u1", "u2"],
        at(4, 10, 0),
        at(4, 11, 0),
    ))?;
    assert!(created.meeting_id.starts_with("meet_"));
    assert_eq!(created.status, MeetingStatus::Scheduled);

    let loaded = calendar
        .get_meeting(&created.meeting_id)?
        .expect("meeting stored");
    assert_eq!(loaded.participants, vec!["u1", "u2"]);
    assert_eq!(loaded.start_time, at(4, 10, 0));
    assert_eq!(loaded.agenda, vec!["status"]);
    assert!(calendar.get_meeting("meet_missing")?.is_none());
    Ok(())
}

#[test]
fn create_meeting_validates_input() {
    let (_users, calendar, _dir) = setup();

    let inverted = calendar.create_meeting(meeting_input("Backwards", &["u1"], at(4, 11, 0), at(4, 10, 0)));
    assert!(matches!(inverted, Err(AppError::Validation { .. })));

    let blank = calendar.create_meeting(meeting_input("  ", &["u1"], at(4, 10, 0), at(4, 11, 0)));
    assert!(matches!(blank, Err(AppError::Validation { .. })));
}

#[test]
fn duplicate_meeting_ids_conflict() -> AppResult<()> {
    let (_users, calendar, _dir) = setup();
    let created = calendar.create_meeting(meeting_input("Sync", &["u1"], at(4, 9, 0), at(4, 9, 30)))?;

    let again: MeetingRecord = created.clone();
    assert!(matches!(
        calendar.insert_meeting(&again),
        Err(AppError::Conflict { .. })
    ));
    Ok(())
}

#[test]
fn range_queries_and_cancellation() -> AppResult<()> {
    let (_users, calendar, _dir) = setup();
    let standup = calendar.create_meeting(meeting_input("Standup", &["u1"], at(4, 9, 0), at(4, 9, 15)))?;
    let planning = calendar.create_meeting(meeting_input("Planning", &["u1", "u2"], at(4, 13, 0), at(4, 14, 0)))?;
    calendar.create_meeting(meeting_input("Retro", &["u1"], at(5, 13, 0), at(5, 14, 0)))?;

    let tuesday = calendar.user_meetings("u1", Some(at(4, 0, 0)), Some(at(5, 0, 0)))?;
    let titles: Vec<_> = tuesday.iter().map(|m| m.title.as_str()).collect();
    assert_eq!(titles, vec!["Standup", "Planning"]);
    assert_eq!(calendar.user_meetings("u1", None, None)?.len(), 3);

    // Touching the end of a booking is not an overlap.
    assert!(calendar.booked_intervals("u1", at(4, 9, 15), at(4, 10, 0))?.is_empty());
    assert_eq!(calendar.booked_intervals("u2", at(4, 13, 30), at(4, 13, 45))?.len(), 1);

    let cancelled = calendar.update_status(&planning.meeting_id, MeetingStatus::Cancelled)?;
    assert_eq!(cancelled.status, MeetingStatus::Cancelled);
    assert!(calendar.booked_intervals("u2", at(4, 13, 30), at(4, 13, 45))?.is_empty());
    // Still listed for the user, just no longer blocking.
    assert_eq!(calendar.user_meetings("u2", None, None)?.len(), 1);

    let nearby = calendar.nearby_meetings("u1", at(4, 9, 30), 30)?;
    assert_eq!(nearby.len(), 1);
    assert_eq!(nearby[0].meeting_id, standup.meeting_id);

    assert!(calendar.delete_meeting(&standup.meeting_id)?);
    assert!(!calendar.delete_meeting(&standup.meeting_id)?);
    assert!(matches!(
        calendar.update_status(&standup.meeting_id, MeetingStatus::Completed),
        Err(AppError::NotFound)
    ));
    Ok(())
}

#[test]
fn sub_second_meeting_ends_still_block() -> AppResult<()> {
    let (_users, calendar, _dir) = setup();
    let ragged_end = at(4, 10, 0) + Duration::milliseconds(500);
    calendar.create_meeting(meeting_input("Overrun", &["u1"], at(4, 9, 0), ragged_end))?;

    let next = calendar.booked_intervals("u1", at(4, 10, 0), at(4, 10, 30))?;
    assert_eq!(next.len(), 1);
    assert!(next[0].end_time >= ragged_end);
    Ok(())
}

#[test]
fn search_is_case_insensitive_and_scoped() -> AppResult<()> {
    let (_users, calendar, _dir) = setup();
    calendar.create_meeting(meeting_input("Quarterly Budget", &["u1"], at(4, 9, 0), at(4, 10, 0)))?;
    calendar.create_meeting(meeting_input("Budget follow-up", &["u2"], at(4, 11, 0), at(4, 12, 0)))?;
    calendar.create_meeting(meeting_input("Hiring sync", &["u1"], at(4, 13, 0), at(4, 14, 0)))?;

    assert_eq!(calendar.search_meetings("BUDGET", None, 10)?.len(), 2);
    let scoped = calendar.search_meetings("budget", Some("u2"), 10)?;
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].title, "Budget follow-up");
    assert_eq!(calendar.search_meetings("budget", None, 1)?.len(), 1);
    assert!(matches!(
        calendar.search_meetings("   ", None, 10),
        Err(AppError::Validation { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn sqlite_collaborators_serve_the_engine() -> AppResult<()> {
    let (users, calendar, _dir) = setup();
    users.import_users(vec![profile("ana", "UTC"), profile("ben", "Europe/London")])?;
    calendar.create_meeting(meeting_input("Busy", &["ben"], at(4, 10, 0), at(4, 10, 30)))?;
    let cancelled = calendar.create_meeting(meeting_input("Dropped", &["ana"], at(4, 9, 0), at(4, 9, 30)))?;
    calendar.update_status(&cancelled.meeting_id, MeetingStatus::Cancelled)?;

    assert!(users.resolve_profile("ana").await?.is_some());
    assert!(users.resolve_profile("zed").await?.is_none());
    assert_eq!(
        calendar.bookings_near("ben", at(4, 10, 45), 30).await?.len(),
        1
    );

    let service = OptimalTimeService::new(Arc::new(users), Arc::new(calendar));
    let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
    let slots = service
        .find_optimal_slots(SlotSearchRequest::new(
            vec!["ana".into(), "ben".into(), "zed".into()],
            30,
            DateRange::new(day, day),
        ))
        .await?;

    assert!(!slots.is_empty());
    // Cancelled meetings do not block, so 09:00 stays available.
    assert_eq!(slots[0].slot.start_time, at(4, 9, 0));
    assert!(slots
        .iter()
        .all(|s| s.slot.end_time <= at(4, 10, 0) || s.slot.start_time >= at(4, 10, 30)));
    assert!(slots.iter().all(|s| s.slot.participant_ids == vec!["ana", "ben"]));
    Ok(())
}
