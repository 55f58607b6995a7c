use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use meeting_assistant_lib::error::{AppError, AppResult};
use meeting_assistant_lib::models::meeting::BookedInterval;
use meeting_assistant_lib::models::scheduling::{DateRange, RankedSlot, SlotSearchRequest};
use meeting_assistant_lib::models::settings::EngineSettings;
use meeting_assistant_lib::models::user::{ProductivePeriod, UserPreferences, UserProfile};
use meeting_assistant_lib::services::collaborators::{
    AvailabilitySource, InMemoryDirectory, ProfileSource,
};
use meeting_assistant_lib::services::optimal_time_service::OptimalTimeService;

fn clock(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("clock time")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn nine_to_five(user_id: &str, zone: &str) -> UserProfile {
    UserProfile::new(
        user_id,
        format!("User {user_id}"),
        UserPreferences::with_working_hours(zone, clock(9, 0), clock(17, 0)),
    )
}

fn engine(directory: Arc<InMemoryDirectory>) -> OptimalTimeService {
    OptimalTimeService::new(directory.clone(), directory)
}

fn request(ids: &[&str], minutes: i64, start: NaiveDate, end: NaiveDate) -> SlotSearchRequest {
    SlotSearchRequest::new(
        ids.iter().map(|id| id.to_string()).collect(),
        minutes,
        DateRange::new(start, end),
    )
}

/// Invariants every successful response must satisfy.
fn assert_well_formed(
    slots: &[RankedSlot],
    minutes: i64,
    profiles: &[UserProfile],
    directory_bookings: &[BookedInterval],
) {
    assert!(slots.len() <= 5);
    for (index, ranked) in slots.iter().enumerate() {
        assert_eq!(ranked.rank, index + 1, "ranks are dense from 1");
        assert_eq!(
            ranked.slot.end_time - ranked.slot.start_time,
            Duration::minutes(minutes)
        );
        assert_eq!(ranked.slot.duration_minutes, minutes);

        let expected = 0.4 * ranked.productivity_score
            + 0.3 * ranked.convenience_score
            + 0.2 * ranked.conflict_risk_score
            + 0.1 * ranked.preference_score;
        assert!((ranked.overall_score - expected).abs() < 1e-9);

        for profile in profiles {
            let tz: Tz = profile.preferences.time_zone.parse().expect("zone");
            let local_start = ranked.slot.start_time.with_timezone(&tz);
            let local_end = ranked.slot.end_time.with_timezone(&tz);
            assert_eq!(local_start.date_naive(), local_end.date_naive());
            assert!(local_start.time() >= profile.preferences.working_hours_start);
            assert!(local_end.time() <= profile.preferences.working_hours_end);
        }

        for booking in directory_bookings {
            assert!(
                !booking.overlaps(ranked.slot.start_time, ranked.slot.end_time),
                "slot at {} overlaps a booking",
                ranked.slot.start_time
            );
        }
    }

    for pair in slots.windows(2) {
        assert!(pair[0].overall_score >= pair[1].overall_score);
    }
}

#[tokio::test]
async fn same_zone_pair_gets_morning_slots() -> AppResult<()> {
    let profiles = vec![
        nine_to_five("alice", "America/New_York"),
        nine_to_five("bob", "America/New_York"),
    ];
    let directory = Arc::new(InMemoryDirectory::with_profiles(profiles.clone()));
    let service = engine(directory);

    // Tuesday; New York is on EST (UTC-5).
    let slots = service
        .find_optimal_slots(request(&["alice", "bob"], 30, date(2025, 3, 4), date(2025, 3, 4)))
        .await?;

    assert_eq!(slots.len(), 5);
    assert_well_formed(&slots, 30, &profiles, &[]);

    let first = &slots[0];
    assert_eq!(first.slot.start_time, utc(2025, 3, 4, 14, 0));
    assert!(first.productivity_score >= 5.0);
    assert_eq!(first.conflict_risk_score, 8.0);
    assert_eq!(first.participant_impact["alice"].local_time, "09:00 AM EST");
    assert_eq!(
        first.explanation,
        "Suboptimal productivity time. Convenient time across time zones. Low conflict risk."
    );

    // Equal scores keep chronological order.
    let starts: Vec<_> = slots.iter().map(|s| s.slot.start_time).collect();
    let mut sorted = starts.clone();
    sorted.sort();
    assert_eq!(starts, sorted);
    Ok(())
}

#[tokio::test]
async fn booked_time_is_avoided() -> AppResult<()> {
    let profiles = vec![nine_to_five("carol", "UTC")];
    let directory = Arc::new(InMemoryDirectory::with_profiles(profiles.clone()));
    let booking = BookedInterval::new("carol", utc(2025, 3, 4, 10, 0), utc(2025, 3, 4, 10, 30));
    directory.add_booking(booking.clone());

    let slots = engine(directory)
        .find_optimal_slots(request(&["carol"], 60, date(2025, 3, 4), date(2025, 3, 4)))
        .await?;

    assert!(!slots.is_empty());
    assert_well_formed(&slots, 60, &profiles, &[booking]);
    assert!(slots
        .iter()
        .all(|s| s.slot.start_time != utc(2025, 3, 4, 9, 30) && s.slot.start_time != utc(2025, 3, 4, 10, 0)));
    Ok(())
}

#[tokio::test]
async fn productive_periods_drive_ranking() -> AppResult<()> {
    let mut dana = nine_to_five("dana", "UTC");
    dana.preferences.productive_periods = vec![ProductivePeriod::Afternoon];
    let profiles = vec![dana];
    let directory = Arc::new(InMemoryDirectory::with_profiles(profiles.clone()));

    let slots = engine(directory)
        .find_optimal_slots(request(&["dana"], 30, date(2025, 3, 4), date(2025, 3, 4)))
        .await?;

    assert_well_formed(&slots, 30, &profiles, &[]);
    let starts: Vec<_> = slots.iter().map(|s| s.slot.start_time).collect();
    assert_eq!(
        starts,
        vec![
            utc(2025, 3, 4, 12, 0),
            utc(2025, 3, 4, 12, 30),
            utc(2025, 3, 4, 13, 0),
            utc(2025, 3, 4, 13, 30),
            utc(2025, 3, 4, 14, 0),
        ]
    );
    assert!(slots.iter().all(|s| s.productivity_score == 8.5));
    assert_eq!(slots[0].reasoning.productivity_analysis, "Score: 8.5/10");
    Ok(())
}

#[tokio::test]
async fn nearby_meetings_lower_conflict_risk() -> AppResult<()> {
    let profiles = vec![nine_to_five("erin", "UTC")];
    let directory = Arc::new(InMemoryDirectory::with_profiles(profiles.clone()));
    // Blocks 09:00-10:00 and sits within 30 minutes of a 10:00 start.
    directory.add_booking(BookedInterval::new(
        "erin",
        utc(2025, 3, 4, 9, 0),
        utc(2025, 3, 4, 10, 0),
    ));

    let slots = engine(directory)
        .find_optimal_slots(request(&["erin"], 30, date(2025, 3, 4), date(2025, 3, 4)))
        .await?;

    // 10:00 is the only candidate near the booking; it drops below 11:00-12:30.
    let starts: Vec<_> = slots.iter().map(|s| s.slot.start_time).collect();
    assert_eq!(starts[0], utc(2025, 3, 4, 10, 30));
    assert!(!starts.contains(&utc(2025, 3, 4, 10, 0)));
    assert!(slots.iter().all(|s| s.conflict_risk_score == 8.0));
    Ok(())
}

#[tokio::test]
async fn disjoint_time_zones_return_empty() -> AppResult<()> {
    let directory = Arc::new(InMemoryDirectory::with_profiles(vec![
        nine_to_five("tokyo", "Asia/Tokyo"),
        nine_to_five("berlin", "Europe/Berlin"),
        nine_to_five("la", "America/Los_Angeles"),
    ]));

    let slots = engine(directory)
        .find_optimal_slots(request(
            &["tokyo", "berlin", "la"],
            30,
            date(2025, 3, 3),
            date(2025, 3, 7),
        ))
        .await?;
    assert!(slots.is_empty());
    Ok(())
}

#[tokio::test]
async fn weekend_only_range_returns_empty() -> AppResult<()> {
    let directory = Arc::new(InMemoryDirectory::with_profiles(vec![nine_to_five(
        "frank", "UTC",
    )]));

    let slots = engine(directory)
        .find_optimal_slots(request(&["frank"], 30, date(2025, 3, 8), date(2025, 3, 9)))
        .await?;
    assert!(slots.is_empty());
    Ok(())
}

#[tokio::test]
async fn full_window_duration_yields_one_slot_per_weekday() -> AppResult<()> {
    let profiles = vec![nine_to_five("gina", "America/New_York")];
    let directory = Arc::new(InMemoryDirectory::with_profiles(profiles.clone()));
    let service = engine(directory);

    // Friday before and Monday after the 2025 spring-forward change.
    let slots = service
        .find_optimal_slots(request(&["gina"], 480, date(2025, 3, 7), date(2025, 3, 10)))
        .await?;
    assert_well_formed(&slots, 480, &profiles, &[]);

    let mut starts: Vec<_> = slots.iter().map(|s| s.slot.start_time).collect();
    starts.sort();
    assert_eq!(starts, vec![utc(2025, 3, 7, 14, 0), utc(2025, 3, 10, 13, 0)]);

    let too_long = service
        .find_optimal_slots(request(&["gina"], 481, date(2025, 3, 7), date(2025, 3, 10)))
        .await?;
    assert!(too_long.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_participants_are_dropped() -> AppResult<()> {
    let directory = Arc::new(InMemoryDirectory::with_profiles(vec![nine_to_five(
        "hana", "UTC",
    )]));
    let service = engine(directory);

    let slots = service
        .find_optimal_slots(request(
            &["ghost", "hana", "hana"],
            30,
            date(2025, 3, 4),
            date(2025, 3, 4),
        ))
        .await?;
    assert!(!slots.is_empty());
    assert!(slots.iter().all(|s| s.slot.participant_ids == vec!["hana"]));
    assert!(slots.iter().all(|s| s.participant_impact.len() == 1));

    let none = service
        .find_optimal_slots(request(&["ghost", "phantom"], 30, date(2025, 3, 4), date(2025, 3, 4)))
        .await;
    assert!(matches!(none, Err(AppError::InvalidParticipants { .. })));
    Ok(())
}

#[tokio::test]
async fn invalid_requests_fail_before_lookup() {
    let service = engine(Arc::new(InMemoryDirectory::new()));
    let day = date(2025, 3, 4);

    for bad in [
        request(&[], 30, day, day),
        request(&["a"], 0, day, day),
        request(&["a"], -30, day, day),
        request(&["a"], 30, day, date(2025, 3, 3)),
    ] {
        let result = service.find_optimal_slots(bad).await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }
}

#[tokio::test]
async fn friday_free_blocks_lower_preference() -> AppResult<()> {
    let mut ivy = nine_to_five("ivy", "UTC");
    ivy.preferences.meeting_free_blocks = vec!["Friday afternoon".to_string()];
    let directory = Arc::new(InMemoryDirectory::with_profiles(vec![ivy, nine_to_five("jon", "UTC")]));

    let slots = engine(directory)
        .find_optimal_slots(request(&["ivy", "jon"], 30, date(2025, 3, 7), date(2025, 3, 7)))
        .await?;
    assert!(!slots.is_empty());
    assert!(slots.iter().all(|s| s.preference_score == 7.0));
    Ok(())
}

#[tokio::test]
async fn repeated_calls_are_identical() -> AppResult<()> {
    let mut kim = nine_to_five("kim", "Europe/London");
    kim.preferences.productive_periods = vec![ProductivePeriod::Morning, ProductivePeriod::LateAfternoon];
    kim.preferences.lunch_break_start = Some(clock(12, 0));
    kim.preferences.lunch_break_end = Some(clock(13, 0));
    let directory = Arc::new(InMemoryDirectory::with_profiles(vec![
        kim,
        nine_to_five("lee", "Europe/Berlin"),
    ]));
    directory.add_booking(BookedInterval::new(
        "lee",
        utc(2025, 3, 5, 10, 0),
        utc(2025, 3, 5, 11, 0),
    ));

    let service = OptimalTimeService::with_settings(
        directory.clone(),
        directory,
        &EngineSettings {
            max_concurrent_lookups: 2,
            ..EngineSettings::default()
        },
    );
    let search = request(&["kim", "lee"], 45, date(2025, 3, 3), date(2025, 3, 7));

    let first = service.find_optimal_slots(search.clone()).await?;
    let second = service.find_optimal_slots(search).await?;
    assert!(!first.is_empty());
    assert_eq!(first, second);
    Ok(())
}

struct FailingCalendar;

#[async_trait]
impl AvailabilitySource for FailingCalendar {
    async fn bookings_in_range(
        &self,
        _user_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> AppResult<Vec<BookedInterval>> {
        Err(AppError::collaborator("availability", "calendar store offline"))
    }
}

#[tokio::test]
async fn collaborator_failures_abort_the_call() {
    let directory = Arc::new(InMemoryDirectory::with_profiles(vec![nine_to_five(
        "mia", "UTC",
    )]));
    let service = OptimalTimeService::new(directory, Arc::new(FailingCalendar));

    let result = service
        .find_optimal_slots(request(&["mia"], 30, date(2025, 3, 4), date(2025, 3, 4)))
        .await;
    assert!(matches!(result, Err(AppError::Collaborator { .. })));
}

/// Wraps the in-memory directory and records the peak number of
/// collaborator reads in flight at once.
struct CountingDirectory {
    inner: InMemoryDirectory,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl CountingDirectory {
    fn new(inner: InMemoryDirectory) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        // Let sibling lookups start before this one completes.
        tokio::task::yield_now().await;
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProfileSource for CountingDirectory {
    async fn resolve_profile(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        self.enter().await;
        let result = self.inner.resolve_profile(user_id).await;
        self.leave();
        result
    }
}

#[async_trait]
impl AvailabilitySource for CountingDirectory {
    async fn bookings_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<BookedInterval>> {
        self.enter().await;
        let result = self.inner.bookings_in_range(user_id, start, end).await;
        self.leave();
        result
    }
}

fn counted_team() -> Arc<CountingDirectory> {
    let ids = ["p1", "p2", "p3", "p4", "p5", "p6"];
    let inner = InMemoryDirectory::with_profiles(ids.iter().map(|id| nine_to_five(id, "UTC")));
    inner.add_booking(BookedInterval::new(
        "p3",
        utc(2025, 3, 4, 11, 0),
        utc(2025, 3, 4, 12, 0),
    ));
    Arc::new(CountingDirectory::new(inner))
}

#[tokio::test]
async fn concurrent_lookups_never_exceed_the_configured_limit() -> AppResult<()> {
    let ids = ["p1", "p2", "p3", "p4", "p5", "p6"];
    let day = date(2025, 3, 4);

    let mut previous: Option<Vec<RankedSlot>> = None;
    for limit in [1, 3] {
        let directory = counted_team();
        let settings = EngineSettings {
            max_concurrent_lookups: limit,
            ..EngineSettings::default()
        };
        let service =
            OptimalTimeService::with_settings(directory.clone(), directory.clone(), &settings);

        let slots = service.find_optimal_slots(request(&ids, 30, day, day)).await?;
        assert!(!slots.is_empty());
        assert!(slots
            .iter()
            .all(|s| s.slot.end_time <= utc(2025, 3, 4, 11, 0) || s.slot.start_time >= utc(2025, 3, 4, 12, 0)));

        let peak = directory.peak.load(Ordering::SeqCst);
        assert!(peak >= 1);
        assert!(peak <= limit, "limit {limit} but {peak} reads were in flight");
        assert_eq!(directory.in_flight.load(Ordering::SeqCst), 0);

        // The limit changes scheduling only, never the answer.
        if let Some(previous) = previous.replace(slots.clone()) {
            assert_eq!(previous, slots);
        }
    }
    Ok(())
}
