//! Application services layer.

pub mod error;
pub mod jobs;
pub mod orders;
pub mod repos;
