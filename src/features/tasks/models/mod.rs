mod task;

pub use task::{file_task_id, CleanupTaskPayload, FileTaskPayload, Task, TaskKind, TaskStatus};
