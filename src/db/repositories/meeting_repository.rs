use std::convert::TryFrom;

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension, Row};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::meeting::{MeetingRecord, MeetingStatus, MeetingType};

/// Meetings are stored with second precision and a `Z` suffix so that
/// lexical comparison in SQL matches chronological order.
pub fn to_db_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Second-precision form of an interval end, rounded up so the stored
/// interval never shrinks below the real one.
pub fn to_db_end_timestamp(value: DateTime<Utc>) -> String {
    let whole = value.trunc_subsecs(0);
    if whole < value {
        to_db_timestamp(whole + Duration::seconds(1))
    } else {
        to_db_timestamp(whole)
    }
}

pub fn from_db_timestamp(column: &str, raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            AppError::database(format!("column {column} holds invalid timestamp '{raw}': {err}"))
        })
}

#[derive(Debug, Clone)]
pub struct MeetingRow {
    pub meeting_id: String,
    pub title: String,
    pub description: Option<String>,
    pub organizer: String,
    pub start_at: String,
    pub end_at: String,
    pub time_zone: String,
    pub meeting_type: String,
    pub status: String,
    pub location: Option<String>,
    pub agenda_json: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<&Row<'_>> for MeetingRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            meeting_id: row.get("meeting_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            organizer: row.get("organizer")?,
            start_at: row.get("start_at")?,
            end_at: row.get("end_at")?,
            time_zone: row.get("time_zone")?,
            meeting_type: row.get("meeting_type")?,
            status: row.get("status")?,
            location: row.get("location")?,
            agenda_json: row.get("agenda_json")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl MeetingRow {
    pub fn from_record(record: &MeetingRecord) -> AppResult<Self> {
        Ok(Self {
            meeting_id: record.meeting_id.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            organizer: record.organizer.clone(),
            start_at: to_db_timestamp(record.start_time),
            end_at: to_db_end_timestamp(record.end_time),
            time_zone: record.time_zone.clone(),
            meeting_type: record.meeting_type.as_str().to_string(),
            status: record.status.as_str().to_string(),
            location: record.location.clone(),
            agenda_json: serde_json::to_string(&record.agenda)?,
            created_at: to_db_timestamp(record.created_at),
            updated_at: to_db_timestamp(record.updated_at),
        })
    }

    pub fn into_record(self, participants: Vec<String>) -> AppResult<MeetingRecord> {
        let meeting_type = MeetingType::parse(&self.meeting_type).ok_or_else(|| {
            AppError::validation_with_details(
                "unknown meeting type in storage",
                json!({"meetingId": self.meeting_id, "meetingType": self.meeting_type}),
            )
        })?;
        let status = MeetingStatus::parse(&self.status).ok_or_else(|| {
            AppError::validation_with_details(
                "unknown meeting status in storage",
                json!({"meetingId": self.meeting_id, "status": self.status}),
            )
        })?;

        Ok(MeetingRecord {
            start_time: from_db_timestamp("start_at", &self.start_at)?,
            end_time: from_db_timestamp("end_at", &self.end_at)?,
            created_at: from_db_timestamp("created_at", &self.created_at)?,
            updated_at: from_db_timestamp("updated_at", &self.updated_at)?,
            agenda: serde_json::from_str(&self.agenda_json)?,
            meeting_id: self.meeting_id,
            title: self.title,
            description: self.description,
            participants,
            organizer: self.organizer,
            time_zone: self.time_zone,
            meeting_type,
            status,
            location: self.location,
        })
    }
}

const SELECT_COLUMNS: &str = "m.meeting_id, m.title, m.description, m.organizer, m.start_at, \
     m.end_at, m.time_zone, m.meeting_type, m.status, m.location, m.agenda_json, \
     m.created_at, m.updated_at";

pub struct MeetingRepository;

impl MeetingRepository {
    pub fn insert(conn: &Connection, row: &MeetingRow, participants: &[String]) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO meetings (
                    meeting_id, title, description, organizer, start_at, end_at,
                    time_zone, meeting_type, status, location, agenda_json,
                    created_at, updated_at
                ) VALUES (
                    :meeting_id, :title, :description, :organizer, :start_at, :end_at,
                    :time_zone, :meeting_type, :status, :location, :agenda_json,
                    :created_at, :updated_at
                )
            "#,
            named_params! {
                ":meeting_id": row.meeting_id,
                ":title": row.title,
                ":description": row.description,
                ":organizer": row.organizer,
                ":start_at": row.start_at,
                ":end_at": row.end_at,
                ":time_zone": row.time_zone,
                ":meeting_type": row.meeting_type,
                ":status": row.status,
                ":location": row.location,
                ":agenda_json": row.agenda_json,
                ":created_at": row.created_at,
                ":updated_at": row.updated_at,
            },
        )?;

        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO meeting_participants (meeting_id, user_id, position) VALUES (?1, ?2, ?3)",
        )?;
        for (position, user_id) in participants.iter().enumerate() {
            stmt.execute(params![row.meeting_id, user_id, position as i64])?;
        }

        Ok(())
    }

    pub fn find_by_id(conn: &Connection, meeting_id: &str) -> AppResult<Option<MeetingRow>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM meetings m WHERE m.meeting_id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt
            .query_row([meeting_id], |row| MeetingRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn participants_for(conn: &Connection, meeting_id: &str) -> AppResult<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT user_id FROM meeting_participants WHERE meeting_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt
            .query_map([meeting_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Meetings of `user_id` intersecting `(start, end)`, ordered by start.
    /// Either bound may be open.
    pub fn list_for_user(
        conn: &Connection,
        user_id: &str,
        start: Option<&str>,
        end: Option<&str>,
        include_cancelled: bool,
    ) -> AppResult<Vec<MeetingRow>> {
        let sql = format!(
            r#"
                SELECT {SELECT_COLUMNS}
                FROM meetings m
                JOIN meeting_participants p ON p.meeting_id = m.meeting_id
                WHERE p.user_id = :user_id
                  AND (:start IS NULL OR m.end_at > :start)
                  AND (:end IS NULL OR m.start_at < :end)
                  AND (:include_cancelled = 1 OR m.status != 'cancelled')
                ORDER BY m.start_at ASC, m.meeting_id ASC
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":start": start,
                    ":end": end,
                    ":include_cancelled": include_cancelled as i64,
                },
                |row| MeetingRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Case-insensitive match of `needle` (already lower-cased) against
    /// title, description and agenda.
    pub fn search(
        conn: &Connection,
        needle: &str,
        user_id: Option<&str>,
        limit: usize,
    ) -> AppResult<Vec<MeetingRow>> {
        let sql = format!(
            r#"
                SELECT {SELECT_COLUMNS}
                FROM meetings m
                WHERE (
                        instr(lower(m.title), :needle) > 0
                     OR instr(lower(coalesce(m.description, '')), :needle) > 0
                     OR instr(lower(m.agenda_json), :needle) > 0
                  )
                  AND (:user_id IS NULL OR EXISTS (
                        SELECT 1 FROM meeting_participants p
                        WHERE p.meeting_id = m.meeting_id AND p.user_id = :user_id
                  ))
                ORDER BY m.start_at ASC, m.meeting_id ASC
                LIMIT :limit
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                named_params! {
                    ":needle": needle,
                    ":user_id": user_id,
                    ":limit": limit as i64,
                },
                |row| MeetingRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_status(
        conn: &Connection,
        meeting_id: &str,
        status: MeetingStatus,
        updated_at: &str,
    ) -> AppResult<usize> {
        let updated = conn.execute(
            "UPDATE meetings SET status = ?1, updated_at = ?2 WHERE meeting_id = ?3",
            [status.as_str(), updated_at, meeting_id],
        )?;
        Ok(updated)
    }

    pub fn delete(conn: &Connection, meeting_id: &str) -> AppResult<usize> {
        let deleted = conn.execute("DELETE FROM meetings WHERE meeting_id = ?1", [meeting_id])?;
        Ok(deleted)
    }
}
