pub mod aggregator;
pub mod attendance;
pub mod batch;
pub mod erp;
pub mod quiz;
