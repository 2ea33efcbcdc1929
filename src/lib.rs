pub mod aggregate;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod ranking;
pub mod reference;
pub mod report;
pub mod submission;
pub mod workload;
