pub mod dtos;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use models::Settings;
pub use routes::routes;
pub use services::SettingsService;
