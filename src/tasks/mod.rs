//! Tasks module
//!
//! Fan-out of pipeline runs through an external queue. A task payload is
//! the same body the trigger accepts, so a queued task lands back on the
//! trigger as an ordinary run.

mod queue;

pub use queue::{
    chunk_detail_tasks, HttpTaskQueue, MemoryQueue, TaskEnqueuer, TaskPayload, BROADCAST_QUEUE,
    DETAILS_QUEUE, SYNC_QUEUE,
};
