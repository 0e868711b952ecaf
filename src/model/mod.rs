use thiserror::Error;

pub mod record;
pub mod resource;

pub use record::{FieldValue, Fields, Record, RecordId};
pub use resource::{flag, parse_flag, AccessLevel, FileEncoding, KeyMatch, ResourceKind};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid access level `{0}`, expected one of guest, reporter, developer, master")]
    InvalidAccessLevel(String),
    #[error("Invalid file encoding `{0}`, expected text or base64")]
    InvalidEncoding(String),
    #[error("Invalid flag value `{0}`")]
    InvalidFlag(String),
}
