mod secure_file;

#[cfg(test)]
pub(crate) use secure_file::sample_file;
pub use secure_file::{CipherMode, CreateSecureFile, FileStatus, SecureFile};
