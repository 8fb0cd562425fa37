pub mod activity_logs;
pub mod admin_ui;
pub mod auth;
pub mod cleanup;
pub mod downloads;
pub mod files;
pub mod settings;
pub mod tasks;
