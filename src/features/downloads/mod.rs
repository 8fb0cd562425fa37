pub mod dtos;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod token;

pub use services::DownloadService;
pub use token::DownloadTokenSigner;
