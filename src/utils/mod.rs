pub mod clock;
pub mod metrics;
pub mod response_cache;
pub mod summary_cache;
