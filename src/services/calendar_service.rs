use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::repositories::meeting_repository::{
    to_db_end_timestamp, to_db_timestamp, MeetingRepository, MeetingRow,
};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::meeting::{BookedInterval, MeetingCreateInput, MeetingRecord, MeetingStatus};
use crate::services::collaborators::AvailabilitySource;

/// Meeting store backing the availability view of the slot engine.
#[derive(Clone)]
pub struct CalendarService {
    db: DbPool,
}

impl CalendarService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn create_meeting(&self, input: MeetingCreateInput) -> AppResult<MeetingRecord> {
        if input.title.trim().is_empty() {
            return Err(AppError::validation("meeting title must not be blank"));
        }
        if input.participants.is_empty() {
            return Err(AppError::validation("meeting needs at least one participant"));
        }
        if input.end_time <= input.start_time {
            return Err(AppError::validation("meeting must end after it starts"));
        }

        let now = Utc::now();
        let record = MeetingRecord {
            meeting_id: format!("meet_{}", Uuid::new_v4().simple()),
            title: input.title,
            description: input.description,
            participants: input.participants,
            organizer: input.organizer,
            start_time: input.start_time,
            end_time: input.end_time,
            time_zone: input.time_zone,
            meeting_type: input.meeting_type,
            status: MeetingStatus::Scheduled,
            location: input.location,
            agenda: input.agenda,
            created_at: now,
            updated_at: now,
        };

        self.insert_meeting(&record)?;
        info!(
            target: "app::calendar",
            meeting_id = %record.meeting_id,
            participants = record.participants.len(),
            "meeting created"
        );
        Ok(record)
    }

    /// Stores a fully formed record, keeping its id and timestamps.
    pub fn insert_meeting(&self, record: &MeetingRecord) -> AppResult<()> {
        if record.end_time <= record.start_time {
            return Err(AppError::validation("meeting must end after it starts"));
        }
        let row = MeetingRow::from_record(record)?;
        self.db
            .with_transaction(|conn| MeetingRepository::insert(conn, &row, &record.participants))
    }

    pub fn import_meetings(&self, records: Vec<MeetingRecord>) -> AppResult<usize> {
        let rows = records
            .iter()
            .map(|record| {
                if record.end_time <= record.start_time {
                    return Err(AppError::validation(format!(
                        "meeting {} must end after it starts",
                        record.meeting_id
                    )));
                }
                MeetingRow::from_record(record).map(|row| (row, record.participants.clone()))
            })
            .collect::<AppResult<Vec<_>>>()?;

        let count = self.db.with_transaction(|conn| {
            for (row, participants) in &rows {
                MeetingRepository::insert(conn, row, participants)?;
            }
            Ok(rows.len())
        })?;
        info!(target: "app::calendar", count, "meetings imported");
        Ok(count)
    }

    pub fn get_meeting(&self, meeting_id: &str) -> AppResult<Option<MeetingRecord>> {
        self.db.with_connection(|conn| {
            let Some(row) = MeetingRepository::find_by_id(conn, meeting_id)? else {
                return Ok(None);
            };
            let participants = MeetingRepository::participants_for(conn, meeting_id)?;
            row.into_record(participants).map(Some)
        })
    }

    /// Meetings of `user_id` overlapping the optional bounds, cancelled ones
    /// included, ordered by start.
    pub fn user_meetings(
        &self,
        user_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<MeetingRecord>> {
        self.load_for_user(user_id, start, end, true)
    }

    pub fn nearby_meetings(
        &self,
        user_id: &str,
        target: DateTime<Utc>,
        buffer_minutes: i64,
    ) -> AppResult<Vec<MeetingRecord>> {
        let buffer = Duration::minutes(buffer_minutes);
        self.user_meetings(user_id, Some(target - buffer), Some(target + buffer))
    }

    /// Committed time of `user_id` in `[start, end)`; cancelled meetings do
    /// not block anyone.
    pub fn booked_intervals(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<BookedInterval>> {
        let meetings = self.load_for_user(user_id, Some(start), Some(end), false)?;
        debug!(
            target: "app::calendar",
            %user_id,
            count = meetings.len(),
            "loaded booked intervals"
        );
        Ok(meetings
            .iter()
            .map(|meeting| BookedInterval::from_meeting(user_id, meeting))
            .collect())
    }

    pub fn search_meetings(
        &self,
        query: &str,
        user_id: Option<&str>,
        limit: usize,
    ) -> AppResult<Vec<MeetingRecord>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(AppError::validation("search query must not be blank"));
        }
        self.db.with_connection(|conn| {
            MeetingRepository::search(conn, &needle, user_id, limit)?
                .into_iter()
                .map(|row| {
                    let participants = MeetingRepository::participants_for(conn, &row.meeting_id)?;
                    row.into_record(participants)
                })
                .collect()
        })
    }

    pub fn update_status(&self, meeting_id: &str, status: MeetingStatus) -> AppResult<MeetingRecord> {
        let now = to_db_timestamp(Utc::now());
        let updated = self
            .db
            .with_connection(|conn| MeetingRepository::update_status(conn, meeting_id, status, &now))?;
        if updated == 0 {
            warn!(target: "app::calendar", %meeting_id, "status update for unknown meeting");
            return Err(AppError::not_found());
        }
        self.get_meeting(meeting_id)?.ok_or_else(AppError::not_found)
    }

    pub fn delete_meeting(&self, meeting_id: &str) -> AppResult<bool> {
        let deleted = self
            .db
            .with_connection(|conn| MeetingRepository::delete(conn, meeting_id))?;
        if deleted == 0 {
            warn!(target: "app::calendar", %meeting_id, "meeting not found for deletion");
        }
        Ok(deleted > 0)
    }

    fn load_for_user(
        &self,
        user_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        include_cancelled: bool,
    ) -> AppResult<Vec<MeetingRecord>> {
        let start = start.map(to_db_timestamp);
        let end = end.map(to_db_end_timestamp);
        self.db.with_connection(|conn| {
            MeetingRepository::list_for_user(
                conn,
                user_id,
                start.as_deref(),
                end.as_deref(),
                include_cancelled,
            )?
            .into_iter()
            .map(|row| {
                let participants = MeetingRepository::participants_for(conn, &row.meeting_id)?;
                row.into_record(participants)
            })
            .collect()
        })
    }
}

#[async_trait]
impl AvailabilitySource for CalendarService {
    async fn bookings_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<BookedInterval>> {
        let service = self.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || service.booked_intervals(&user_id, start, end))
            .await
            .map_err(|err| {
                AppError::collaborator("availability", format!("lookup task failed: {err}"))
            })?
    }
}
