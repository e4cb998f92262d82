//! Long-running background loops owned by the serve command.

mod cache_sweep;
mod tasks;

pub use cache_sweep::CacheSweepJob;
pub use tasks::BackgroundTasks;
