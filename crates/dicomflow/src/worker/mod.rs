pub mod pool;
pub mod task;

pub use pool::WorkerPool;
pub use task::{patient_label, ProcessingResult, ProcessingStatus, Task};
