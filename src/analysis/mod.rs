pub mod daily;
pub mod jobs;
pub mod stats;
pub mod sweep;
