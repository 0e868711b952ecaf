pub mod cache;
pub mod config;
pub mod model;
pub mod remote;
pub mod report;
pub mod session;

pub use config::LabcacheConfig;
pub use session::{Session, SessionBuilder, SessionError};
