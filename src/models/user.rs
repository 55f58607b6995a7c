use std::ops::Range;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Named part of the day a participant reports as their most effective
/// meeting time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProductivePeriod {
    EarlyMorning,
    Morning,
    Afternoon,
    LateAfternoon,
    Evening,
}

impl ProductivePeriod {
    /// Local hours (half-open) covered by the period.
    pub fn hours(self) -> Range<u32> {
        match self {
            ProductivePeriod::EarlyMorning => 6..9,
            ProductivePeriod::Morning => 9..12,
            ProductivePeriod::Afternoon => 12..15,
            ProductivePeriod::LateAfternoon => 15..18,
            ProductivePeriod::Evening => 18..21,
        }
    }

    /// Productivity value awarded when a slot starts inside the period.
    pub fn tier_score(self) -> f64 {
        match self {
            ProductivePeriod::EarlyMorning => 9.0,
            ProductivePeriod::Morning => 9.5,
            ProductivePeriod::Afternoon => 8.5,
            ProductivePeriod::LateAfternoon => 8.0,
            ProductivePeriod::Evening => 7.0,
        }
    }

    pub fn contains_hour(self, hour: u32) -> bool {
        self.hours().contains(&hour)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WorkingDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

fn default_working_days() -> Vec<WorkingDay> {
    vec![
        WorkingDay::Monday,
        WorkingDay::Tuesday,
        WorkingDay::Wednesday,
        WorkingDay::Thursday,
        WorkingDay::Friday,
    ]
}

fn default_max_daily_meetings() -> u32 {
    8
}

fn default_max_consecutive_meetings() -> u32 {
    3
}

fn default_buffer_minutes() -> u32 {
    15
}

fn default_preferred_duration() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

/// Scheduling preferences of one user. Clock times are local to
/// `time_zone`.
///
/// The numeric knobs at the end (`max_daily_meetings` onwards) are carried
/// for callers that display them; slot ranking does not read them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    pub time_zone: String,
    #[serde(with = "clock")]
    pub working_hours_start: NaiveTime,
    #[serde(with = "clock")]
    pub working_hours_end: NaiveTime,
    #[serde(default = "default_working_days")]
    pub working_days: Vec<WorkingDay>,
    #[serde(default, with = "clock::option")]
    pub lunch_break_start: Option<NaiveTime>,
    #[serde(default, with = "clock::option")]
    pub lunch_break_end: Option<NaiveTime>,
    #[serde(default)]
    pub productive_periods: Vec<ProductivePeriod>,
    #[serde(default, with = "clock::option")]
    pub no_meetings_before: Option<NaiveTime>,
    #[serde(default, with = "clock::option")]
    pub no_meetings_after: Option<NaiveTime>,
    #[serde(default)]
    pub meeting_free_blocks: Vec<String>,
    #[serde(default = "default_max_daily_meetings")]
    pub max_daily_meetings: u32,
    #[serde(default = "default_max_consecutive_meetings")]
    pub max_consecutive_meetings: u32,
    #[serde(default = "default_buffer_minutes")]
    pub buffer_time_minutes: u32,
    #[serde(default = "default_preferred_duration")]
    pub preferred_meeting_duration: u32,
    #[serde(default = "default_true")]
    pub avoid_back_to_back: bool,
}

impl UserPreferences {
    /// Working hours `start..end` in `time_zone`, with every optional field
    /// left empty and the numeric knobs at their defaults.
    pub fn with_working_hours(
        time_zone: impl Into<String>,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Self {
        Self {
            time_zone: time_zone.into(),
            working_hours_start: start,
            working_hours_end: end,
            working_days: default_working_days(),
            lunch_break_start: None,
            lunch_break_end: None,
            productive_periods: Vec::new(),
            no_meetings_before: None,
            no_meetings_after: None,
            meeting_free_blocks: Vec::new(),
            max_daily_meetings: default_max_daily_meetings(),
            max_consecutive_meetings: default_max_consecutive_meetings(),
            buffer_time_minutes: default_buffer_minutes(),
            preferred_meeting_duration: default_preferred_duration(),
            avoid_back_to_back: true,
        }
    }

    pub fn lunch_break(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.lunch_break_start, self.lunch_break_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub manager_id: Option<String>,
    pub preferences: UserPreferences,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: String,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, preferences: UserPreferences) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            email: String::new(),
            role: String::new(),
            department: String::new(),
            manager_id: None,
            preferences,
            is_active: true,
            created_at: String::new(),
        }
    }
}

/// Serde support for local clock times written as `HH:MM` or `HH:MM:SS`.
pub mod clock {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        FORMATS
            .iter()
            .find_map(|format| NaiveTime::parse_from_str(raw.trim(), format).ok())
    }

    pub fn serialize<S>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid clock time '{raw}'")))
    }

    pub mod option {
        use chrono::NaiveTime;
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(time) => serializer.serialize_some(&time.format("%H:%M").to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid clock time '{raw}'"))),
                None => Ok(None),
            }
        }
    }
}
