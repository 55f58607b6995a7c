use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MeetingType {
    #[serde(rename = "1:1")]
    OneOnOne,
    #[default]
    #[serde(rename = "team")]
    Team,
    #[serde(rename = "all_hands")]
    AllHands,
    #[serde(rename = "standup")]
    Standup,
    #[serde(rename = "review")]
    Review,
    #[serde(rename = "planning")]
    Planning,
    #[serde(rename = "brainstorming")]
    Brainstorming,
    #[serde(rename = "interview")]
    Interview,
}

impl MeetingType {
    pub fn as_str(self) -> &'static str {
        match self {
            MeetingType::OneOnOne => "1:1",
            MeetingType::Team => "team",
            MeetingType::AllHands => "all_hands",
            MeetingType::Standup => "standup",
            MeetingType::Review => "review",
            MeetingType::Planning => "planning",
            MeetingType::Brainstorming => "brainstorming",
            MeetingType::Interview => "interview",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "1:1" => Some(MeetingType::OneOnOne),
            "team" => Some(MeetingType::Team),
            "all_hands" => Some(MeetingType::AllHands),
            "standup" => Some(MeetingType::Standup),
            "review" => Some(MeetingType::Review),
            "planning" => Some(MeetingType::Planning),
            "brainstorming" => Some(MeetingType::Brainstorming),
            "interview" => Some(MeetingType::Interview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    #[default]
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
}

impl MeetingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MeetingStatus::Scheduled => "scheduled",
            MeetingStatus::InProgress => "in_progress",
            MeetingStatus::Completed => "completed",
            MeetingStatus::Cancelled => "cancelled",
            MeetingStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled" => Some(MeetingStatus::Scheduled),
            "in_progress" => Some(MeetingStatus::InProgress),
            "completed" => Some(MeetingStatus::Completed),
            "cancelled" => Some(MeetingStatus::Cancelled),
            "rescheduled" => Some(MeetingStatus::Rescheduled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeetingRecord {
    pub meeting_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub participants: Vec<String>,
    pub organizer: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default)]
    pub meeting_type: MeetingType,
    #[serde(default)]
    pub status: MeetingStatus,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub agenda: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeetingCreateInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub participants: Vec<String>,
    pub organizer: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default)]
    pub meeting_type: MeetingType,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub agenda: Vec<String>,
}

/// One participant's committed time, as seen by the slot engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookedInterval {
    pub user_id: String,
    #[serde(default)]
    pub meeting_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl BookedInterval {
    pub fn new(
        user_id: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            meeting_id: None,
            start_time,
            end_time,
        }
    }

    /// Half-open overlap with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.end_time > start
    }

    pub fn from_meeting(user_id: &str, meeting: &MeetingRecord) -> Self {
        Self {
            user_id: user_id.to_string(),
            meeting_id: Some(meeting.meeting_id.clone()),
            start_time: meeting.start_time,
            end_time: meeting.end_time,
        }
    }
}
