pub mod availability_finder;
pub mod calendar_service;
pub mod collaborators;
pub mod optimal_time_service;
pub mod schedule_utils;
pub mod settings_service;
pub mod slot_scorer;
pub mod user_service;
