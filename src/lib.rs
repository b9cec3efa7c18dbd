pub mod api;
pub mod cache;
pub mod clock;
pub mod compare;
pub mod config;
pub mod export;
pub mod metrics;
pub mod models;
pub mod rotation;
pub mod schedule;
pub mod source;
pub mod storage;
pub mod ticker;
