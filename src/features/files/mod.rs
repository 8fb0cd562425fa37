pub mod dtos;
pub mod handlers;
pub mod mime;
pub mod models;
pub mod routes;
pub mod services;

pub use routes::routes;
pub use services::{FileRepository, FileService, UploadService};
