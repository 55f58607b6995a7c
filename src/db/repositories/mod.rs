pub mod meeting_repository;
pub mod settings_repository;
pub mod user_repository;
