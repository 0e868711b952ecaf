//! The seam between the caches and the hosting service.
//!
//! Transport and authentication live behind [`RemoteApi`]; the caches only rely on
//! the paging and mutation contract described on each method.

mod memory;

use thiserror::Error;

use crate::model::{Fields, Record, RecordId, ResourceKind};

pub use memory::{Failure, MemoryRemote, Request};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Request rejected by the remote service: {0}")]
    Rejected(String),
}

/// Position in a paginated collection. Page indices start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub index: u32,
    pub per_page: Option<u32>,
}

impl Page {
    pub fn first(per_page: Option<u32>) -> Self {
        Page { index: 1, per_page }
    }

    pub fn next(self) -> Self {
        Page {
            index: self.index + 1,
            ..self
        }
    }
}

pub trait RemoteApi {
    /// Returns one page of a collection.
    ///
    /// A page past the end of the collection must come back empty, never as an error.
    fn list_page(
        &self,
        kind: ResourceKind,
        parent: Option<&RecordId>,
        page: Page,
    ) -> Result<Vec<Record>, RemoteError>;

    fn create(
        &self,
        kind: ResourceKind,
        parent: Option<&RecordId>,
        fields: &Fields,
    ) -> Result<Record, RemoteError>;

    /// Returns `false` when the service refused the change.
    fn update(
        &self,
        kind: ResourceKind,
        parent: Option<&RecordId>,
        id: &RecordId,
        fields: &Fields,
    ) -> Result<bool, RemoteError>;

    fn set_branch_protection(
        &self,
        repo: &RecordId,
        branch: &str,
        protected: bool,
    ) -> Result<Record, RemoteError>;

    fn get_file(
        &self,
        repo: &RecordId,
        branch: &str,
        path: &str,
    ) -> Result<Option<Record>, RemoteError>;
}
