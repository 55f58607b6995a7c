//! Command line front end for the meeting slot engine.
//!
//! ```bash
//! # Load directory data
//! meeting-assistant --db team.sqlite import-users --file users.json
//! meeting-assistant --db team.sqlite import-meetings --file meetings.json
//!
//! # Recommend slots (request JSON from a file or stdin)
//! echo '{"participants":["u1","u2"],"duration":30,"date_range":["2025-03-03","2025-03-07"]}' \
//!     | meeting-assistant --db team.sqlite recommend
//!
//! # Check one user's calendar
//! meeting-assistant conflicts --user u1 --start 2025-03-04T10:00:00Z --end 2025-03-04T11:00:00Z
//! ```

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Value as JsonValue};
use tracing::{error, info};

use meeting_assistant_lib::db::DbPool;
use meeting_assistant_lib::error::{AppError, AppResult};
use meeting_assistant_lib::models::meeting::MeetingRecord;
use meeting_assistant_lib::models::settings::EngineSettingsUpdate;
use meeting_assistant_lib::models::user::UserProfile;
use meeting_assistant_lib::services::calendar_service::CalendarService;
use meeting_assistant_lib::services::optimal_time_service::OptimalTimeService;
use meeting_assistant_lib::services::settings_service::SettingsService;
use meeting_assistant_lib::services::user_service::UserService;
use meeting_assistant_lib::tools::scheduling_tools::{
    detect_scheduling_conflicts_tool, find_optimal_slots_tool,
};
use meeting_assistant_lib::utils::logger;

#[derive(Parser)]
#[command(name = "meeting-assistant")]
#[command(version)]
#[command(about = "Recommend meeting times that fit every participant's day")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database holding users, meetings and settings
    #[arg(long, global = true, env = "MEETING_ASSISTANT_DB", default_value = "meeting-assistant.sqlite")]
    db: PathBuf,

    /// Directory for daily rolling log files (console only when omitted)
    #[arg(long, global = true, env = "MEETING_ASSISTANT_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank meeting slots for a request
    Recommend {
        /// Request JSON (reads stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List bookings overlapping a time range for one user
    Conflicts {
        #[arg(long)]
        user: String,

        /// Range start, RFC 3339
        #[arg(long)]
        start: String,

        /// Range end, RFC 3339
        #[arg(long)]
        end: String,
    },

    /// Insert or replace users from a JSON array of profiles
    ImportUsers {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Insert meetings from a JSON array of meeting records
    ImportMeetings {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show engine settings, updating any values given
    Settings {
        #[arg(long)]
        max_concurrent_lookups: Option<usize>,

        #[arg(long)]
        profile_cache_capacity: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = match cli.log_dir.as_deref() {
        Some(dir) => logger::init_logging(dir),
        None => logger::init_console_logging(),
    };
    if let Err(err) = logging {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            error!(target: "app::cli", error = %err, "command failed");
            let mut body = json!({"success": false, "error": err.to_string()});
            if let Some(details) = err.details() {
                body["details"] = details.clone();
            }
            println!("{body}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> AppResult<JsonValue> {
    let pool = DbPool::new(cli.db)?;

    match cli.command {
        Commands::Recommend { file } => {
            let raw = read_input(file.as_deref())?;
            let args: JsonValue = serde_json::from_str(&raw)?;

            let settings = SettingsService::new(pool.clone()).get()?;
            let users = UserService::with_cache_capacity(pool.clone(), settings.profile_cache_capacity);
            let calendar = CalendarService::new(pool);
            let service = OptimalTimeService::with_settings(
                Arc::new(users),
                Arc::new(calendar),
                &settings,
            );
            find_optimal_slots_tool(Arc::new(service), args).await
        }
        Commands::Conflicts { user, start, end } => {
            let args = json!({"user_id": user, "start_time": start, "end_time": end});
            detect_scheduling_conflicts_tool(Arc::new(CalendarService::new(pool)), args).await
        }
        Commands::ImportUsers { file } => {
            let profiles: Vec<UserProfile> = serde_json::from_str(&read_input(Some(&file))?)?;
            let imported = UserService::new(pool).import_users(profiles)?;
            info!(target: "app::cli", imported, "user import finished");
            Ok(json!({"success": true, "imported": imported}))
        }
        Commands::ImportMeetings { file } => {
            let meetings: Vec<MeetingRecord> = serde_json::from_str(&read_input(Some(&file))?)?;
            let imported = CalendarService::new(pool).import_meetings(meetings)?;
            info!(target: "app::cli", imported, "meeting import finished");
            Ok(json!({"success": true, "imported": imported}))
        }
        Commands::Settings {
            max_concurrent_lookups,
            profile_cache_capacity,
        } => {
            let service = SettingsService::new(pool);
            let update = EngineSettingsUpdate {
                max_concurrent_lookups,
                profile_cache_capacity,
            };
            let settings = if update == EngineSettingsUpdate::default() {
                service.get()?
            } else {
                service.update(update)?
            };
            Ok(serde_json::to_value(settings)?)
        }
    }
}

fn read_input(file: Option<&Path>) -> AppResult<String> {
    match file {
        Some(path) => fs::read_to_string(path).map_err(|err| {
            AppError::validation(format!("cannot read {}: {err}", path.display()))
        }),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
