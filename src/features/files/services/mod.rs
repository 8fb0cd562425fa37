mod file_repository;
mod file_service;
mod upload_service;

pub use file_repository::FileRepository;
pub use file_service::FileService;
pub use upload_service::{validate_upload, Protected, UploadContext, UploadService};

#[cfg(test)]
pub(crate) use upload_service::tests::test_upload_service;
