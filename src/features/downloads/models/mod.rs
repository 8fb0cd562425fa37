mod download_reference;

pub use download_reference::DownloadReference;
