mod log_dto;

pub use log_dto::LogQuery;
