use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
};

use log::trace;

use crate::model::{FieldValue, Fields, Record, RecordId, ResourceKind};

use super::{Page, RemoteApi, RemoteError};

type CollectionKey = (ResourceKind, Option<RecordId>);

/// A request observed by [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List {
        kind: ResourceKind,
        parent: Option<RecordId>,
        page: u32,
    },
    Create {
        kind: ResourceKind,
    },
    Update {
        kind: ResourceKind,
        id: RecordId,
    },
    Protect {
        branch: String,
    },
    GetFile {
        path: String,
    },
}

/// Failure to inject into the next matching request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Failure {
    #[default]
    None,
    /// Page requests succeed this many times, then fail.
    ListAfter(usize),
    Create,
    /// Create succeeds remotely but answers with a record lacking its identifier.
    MalformedCreate,
    Update,
}

/// An in-process [`RemoteApi`] holding its collections in memory.
///
/// Useful for dry runs and tests: every request is recorded and failures can be
/// injected. Collections are served in insertion order, `page_size` records at a time
/// unless a page asks for its own size.
pub struct MemoryRemote {
    page_size: u32,
    collections: RefCell<HashMap<CollectionKey, Vec<Record>>>,
    requests: RefCell<Vec<Request>>,
    failure: Cell<Failure>,
    next_id: Cell<i64>,
}

impl MemoryRemote {
    pub fn new(page_size: u32) -> Self {
        MemoryRemote {
            page_size: page_size.max(1),
            collections: RefCell::new(HashMap::new()),
            requests: RefCell::new(Vec::new()),
            failure: Cell::new(Failure::None),
            next_id: Cell::new(1000),
        }
    }

    pub fn with_records(
        self,
        kind: ResourceKind,
        parent: Option<RecordId>,
        records: impl IntoIterator<Item = Record>,
    ) -> Self {
        self.collections
            .borrow_mut()
            .entry((kind, parent))
            .or_default()
            .extend(records);
        self
    }

    /// Adds a record remotely, as another actor would.
    pub fn push(&self, kind: ResourceKind, parent: Option<RecordId>, record: Record) {
        self.collections
            .borrow_mut()
            .entry((kind, parent))
            .or_default()
            .push(record);
    }

    /// Removes a record remotely, as another actor would.
    pub fn remove(&self, kind: ResourceKind, parent: Option<RecordId>, id: &RecordId) {
        if let Some(records) = self.collections.borrow_mut().get_mut(&(kind, parent)) {
            records.retain(|record| record.id_for(kind).as_ref() != Some(id));
        }
    }

    pub fn fail(&self, failure: Failure) {
        self.failure.set(failure);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    /// Number of page requests issued for `kind`.
    pub fn list_requests(&self, kind: ResourceKind) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|request| matches!(request, Request::List { kind: k, .. } if *k == kind))
            .count()
    }

    /// Number of requests other than page requests.
    pub fn mutation_requests(&self) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|request| !matches!(request, Request::List { .. }))
            .count()
    }

    fn record(&self, request: Request) {
        trace!("Memory remote received {:?}", request);
        self.requests.borrow_mut().push(request);
    }

    fn allocate_id(&self) -> i64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn find(&self, kind: ResourceKind, parent: Option<&RecordId>, id: &RecordId) -> Option<Record> {
        self.collections
            .borrow()
            .get(&(kind, parent.cloned()))
            .and_then(|records| {
                records
                    .iter()
                    .find(|record| record.id_for(kind).as_ref() == Some(id))
                    .cloned()
            })
    }

    fn materialize(
        &self,
        kind: ResourceKind,
        parent: Option<&RecordId>,
        fields: &Fields,
    ) -> Result<Record, RemoteError> {
        let mut record = Record::new();
        record.merge(fields);
        match kind {
            ResourceKind::Branch => {
                let name = fields
                    .get("branch_name")
                    .cloned()
                    .ok_or_else(|| RemoteError::Rejected("branch_name is missing".to_owned()))?;
                record.insert("name", name);
                record.insert("protected", false);
            }
            ResourceKind::Member => {
                let user_id = fields
                    .get("user_id")
                    .and_then(FieldValue::as_int)
                    .ok_or_else(|| RemoteError::Rejected("user_id is missing".to_owned()))?;
                let user = self.find(ResourceKind::User, None, &RecordId::Int(user_id));
                record.insert("id", user_id);
                if let Some(username) = user.as_ref().and_then(|user| user.get_str("username")) {
                    record.insert("username", username);
                }
            }
            ResourceKind::File => {}
            ResourceKind::Repository => {
                record.insert("id", self.allocate_id());
                let name = record.get_str("name").unwrap_or_default().to_owned();
                let namespace = fields
                    .get("namespace_id")
                    .and_then(FieldValue::as_int)
                    .and_then(|id| self.find(ResourceKind::Namespace, None, &RecordId::Int(id)));
                if let Some(namespace) = namespace {
                    if let Some(path) = namespace.get_str("path") {
                        record.insert("path_with_namespace", format!("{path}/{name}"));
                    }
                    let embedded = namespace
                        .fields()
                        .map(|(field, value)| (field.to_owned(), value.clone()))
                        .collect();
                    record.insert("namespace", FieldValue::Map(embedded));
                }
                record.insert("path", name);
            }
            _ => record.insert("id", self.allocate_id()),
        }
        if let Some(parent) = parent {
            record.insert("parent_id", parent.clone());
        }
        Ok(record)
    }
}

impl RemoteApi for MemoryRemote {
    fn list_page(
        &self,
        kind: ResourceKind,
        parent: Option<&RecordId>,
        page: Page,
    ) -> Result<Vec<Record>, RemoteError> {
        self.record(Request::List {
            kind,
            parent: parent.cloned(),
            page: page.index,
        });

        if let Failure::ListAfter(remaining) = self.failure.get() {
            if remaining == 0 {
                return Err(RemoteError::Transport("connection reset".to_owned()));
            }
            self.failure.set(Failure::ListAfter(remaining - 1));
        }

        let per_page = page.per_page.unwrap_or(self.page_size).max(1) as usize;
        let skip = (page.index.max(1) as usize - 1) * per_page;
        let collections = self.collections.borrow();
        let records: Vec<Record> = collections
            .get(&(kind, parent.cloned()))
            .map(|records| records.iter().skip(skip).take(per_page).cloned().collect())
            .unwrap_or_default();
        Ok(records)
    }

    fn create(
        &self,
        kind: ResourceKind,
        parent: Option<&RecordId>,
        fields: &Fields,
    ) -> Result<Record, RemoteError> {
        self.record(Request::Create { kind });
        match self.failure.get() {
            Failure::Create => return Err(RemoteError::Rejected("400 Bad request".to_owned())),
            Failure::MalformedCreate => return Ok(Record::new().with("message", "accepted")),
            _ => {}
        }

        let record = self.materialize(kind, parent, fields)?;
        self.push(kind, parent.cloned(), record.clone());
        Ok(record)
    }

    fn update(
        &self,
        kind: ResourceKind,
        parent: Option<&RecordId>,
        id: &RecordId,
        fields: &Fields,
    ) -> Result<bool, RemoteError> {
        self.record(Request::Update {
            kind,
            id: id.clone(),
        });
        if self.failure.get() == Failure::Update {
            return Ok(false);
        }

        // Files share a path across branches.
        let branch = match kind {
            ResourceKind::File => fields.get("branch_name"),
            _ => None,
        };
        let mut collections = self.collections.borrow_mut();
        let record = collections
            .get_mut(&(kind, parent.cloned()))
            .and_then(|records| {
                records.iter_mut().find(|record| {
                    record.id_for(kind).as_ref() == Some(id)
                        && branch.map_or(true, |branch| record.get("branch_name") == Some(branch))
                })
            });
        match record {
            Some(record) => {
                record.merge(fields);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_branch_protection(
        &self,
        repo: &RecordId,
        branch: &str,
        protected: bool,
    ) -> Result<Record, RemoteError> {
        self.record(Request::Protect {
            branch: branch.to_owned(),
        });

        let mut collections = self.collections.borrow_mut();
        let record = collections
            .get_mut(&(ResourceKind::Branch, Some(repo.clone())))
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|record| record.get_str("name") == Some(branch))
            })
            .ok_or_else(|| RemoteError::Rejected(format!("404 Branch {branch} Not Found")))?;
        record.insert("protected", protected);
        Ok(record.clone())
    }

    fn get_file(
        &self,
        repo: &RecordId,
        branch: &str,
        path: &str,
    ) -> Result<Option<Record>, RemoteError> {
        self.record(Request::GetFile {
            path: path.to_owned(),
        });

        let collections = self.collections.borrow();
        let file = collections
            .get(&(ResourceKind::File, Some(repo.clone())))
            .and_then(|files| {
                files.iter().find(|file| {
                    file.get_str("file_path") == Some(path)
                        && file.get_str("branch_name") == Some(branch)
                })
            })
            .cloned();
        Ok(file)
    }
}
