pub mod baseline;
pub mod config;
pub mod drift;
pub mod engine;
pub mod errors;
pub mod model;
pub mod performance;
pub mod recorder;
pub mod reliability;
pub mod stats;
pub mod storage;
