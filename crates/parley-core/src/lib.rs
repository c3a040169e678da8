pub mod config;
pub mod error;
pub mod event_log;
pub mod finalize;
pub mod model;
pub mod registry;
pub mod relay;
pub mod responder;
pub mod storage;
