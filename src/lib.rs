// src/lib.rs
pub mod acquisition;
pub mod config;
pub mod device;
pub mod engine;
pub mod recorder;
pub mod session;
pub mod types;

pub use acquisition::AcquisitionError;
pub use config::Config;
pub use session::{Session, SessionSummary, TickReport};
