mod download_dto;

pub use download_dto::*;
