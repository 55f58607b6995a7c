pub mod meeting;
pub mod scheduling;
pub mod settings;
pub mod user;
