mod chunk_processor;
mod task_service;

pub use chunk_processor::ChunkProcessor;
pub use task_service::{ensure_can_access, progress_percent, ProgressUpdate, TaskService};
