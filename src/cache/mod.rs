//! In-memory materialization of remote collections.
//!
//! A [`ResourceCache`] holds one collection in fetch order together with an index
//! from identity to position, so a record reached through the index is the very
//! record stored in the ordered list. Refreshing always replaces both wholesale.

pub mod dependent;

use std::{collections::HashMap, num::NonZeroU32};

use log::{debug, info, trace, warn};
use thiserror::Error;

use crate::{
    model::{Record, RecordId, ResourceKind},
    remote::{Page, RemoteApi, RemoteError},
};

pub use dependent::DependentCache;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Error while fetching page {page} of {kind} records: {source}")]
    Transport {
        kind: ResourceKind,
        page: u32,
        source: RemoteError,
    },
    #[error("Page {page} of {kind} records contained a record without `{field}`")]
    MissingId {
        kind: ResourceKind,
        page: u32,
        field: &'static str,
    },
}

/// How a pagination sweep recognizes the end of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The sweep stops at the first empty page.
    EmptyPage,
    /// Pages are requested with a fixed size and the sweep stops at the first page
    /// holding fewer records than that.
    ShortPage { per_page: NonZeroU32 },
}

impl Termination {
    fn per_page(self) -> Option<u32> {
        match self {
            Termination::EmptyPage => None,
            Termination::ShortPage { per_page } => Some(per_page.get()),
        }
    }

    fn is_last(self, page_len: usize) -> bool {
        match self {
            Termination::EmptyPage => page_len == 0,
            Termination::ShortPage { per_page } => page_len < per_page.get() as usize,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceCache {
    kind: ResourceKind,
    parent: Option<RecordId>,
    termination: Termination,
    items: Vec<Record>,
    by_id: HashMap<RecordId, usize>,
    populated: bool,
}

impl ResourceCache {
    pub fn new(kind: ResourceKind) -> Self {
        Self::with_termination(kind, None, Termination::EmptyPage)
    }

    pub(crate) fn with_termination(
        kind: ResourceKind,
        parent: Option<RecordId>,
        termination: Termination,
    ) -> Self {
        ResourceCache {
            kind,
            parent,
            termination,
            items: Vec::new(),
            by_id: HashMap::new(),
            populated: false,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the whole collection, sweeping the remote unless a populated cache may be reused.
    ///
    /// A failed sweep leaves the previous contents in place.
    pub fn fetch_all<R>(&mut self, remote: &R, use_cache: bool) -> Result<&[Record], CacheError>
    where
        R: RemoteApi + ?Sized,
    {
        if use_cache && self.populated {
            trace!("Serving {} records from cache", self.kind);
            return Ok(&self.items);
        }

        let (items, by_id) = self.sweep(remote)?;
        self.items = items;
        self.by_id = by_id;
        self.populated = true;

        Ok(&self.items)
    }

    fn sweep<R>(&self, remote: &R) -> Result<(Vec<Record>, HashMap<RecordId, usize>), CacheError>
    where
        R: RemoteApi + ?Sized,
    {
        let mut items = Vec::new();
        let mut by_id = HashMap::new();
        let mut page = Page::first(self.termination.per_page());

        loop {
            debug!("Requesting page {} of {} records", page.index, self.kind);
            let records = remote
                .list_page(self.kind, self.parent.as_ref(), page)
                .map_err(|source| CacheError::Transport {
                    kind: self.kind,
                    page: page.index,
                    source,
                })?;
            let page_len = records.len();

            for record in records {
                let id = record.id_for(self.kind).ok_or(CacheError::MissingId {
                    kind: self.kind,
                    page: page.index,
                    field: self.kind.id_field(),
                })?;
                if by_id.contains_key(&id) {
                    warn!(
                        "Dropping duplicate {} {} delivered on page {}",
                        self.kind, id, page.index
                    );
                    continue;
                }
                by_id.insert(id, items.len());
                items.push(record);
            }

            if self.termination.is_last(page_len) {
                break;
            }
            page = page.next();
        }

        info!("Fetched {} {} records", items.len(), self.kind);
        Ok((items, by_id))
    }

    /// Finds the single record whose key matches.
    ///
    /// Several matches are as good as none.
    pub fn lookup_by_key(&self, key: &str) -> Option<&Record> {
        let matcher = self.kind.key_match();
        let mut matches = self
            .items
            .iter()
            .filter(|record| matcher.matches(record, key));
        match (matches.next(), matches.next()) {
            (Some(record), None) => Some(record),
            (Some(_), Some(_)) => {
                debug!("Key {} matches several {} records", key, self.kind);
                None
            }
            _ => None,
        }
    }

    /// Never triggers a fetch.
    pub fn lookup_by_id(&self, id: &RecordId) -> Option<&Record> {
        self.by_id.get(id).map(|&index| &self.items[index])
    }

    pub fn contains_id(&self, id: &RecordId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn export(&self) -> &[Record] {
        &self.items
    }

    pub(crate) fn lookup_by_id_mut(&mut self, id: &RecordId) -> Option<&mut Record> {
        let index = self.by_id.get(id).copied()?;
        self.items.get_mut(index)
    }

    /// Folds a record returned by the remote into the collection.
    ///
    /// A record with a known identity replaces the cached one in place. Returns `None`
    /// and leaves the cache untouched when the record carries no identity.
    pub(crate) fn insert(&mut self, record: Record) -> Option<&Record> {
        let id = record.id_for(self.kind)?;
        let index = match self.by_id.get(&id).copied() {
            Some(index) => {
                self.items[index] = record;
                index
            }
            None => {
                self.by_id.insert(id, self.items.len());
                self.items.push(record);
                self.items.len() - 1
            }
        };
        Some(&self.items[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::remote::{Failure, MemoryRemote};

    use pretty_assertions::assert_eq;

    fn group(id: i64, path: &str) -> Record {
        Record::new().with("id", id).with("path", path)
    }

    fn groups(count: i64) -> Vec<Record> {
        (1..=count).map(|id| group(id, &format!("g{id}"))).collect()
    }

    fn assert_index_in_sync(cache: &ResourceCache) {
        assert_eq!(cache.by_id.len(), cache.items.len());
        for record in cache.export() {
            let id = record.id_for(cache.kind()).unwrap();
            assert!(std::ptr::eq(cache.lookup_by_id(&id).unwrap(), record));
        }
    }

    #[test]
    fn sweep_stops_at_empty_page() {
        let remote = MemoryRemote::new(4).with_records(ResourceKind::Group, None, groups(12));
        let mut cache = ResourceCache::new(ResourceKind::Group);

        let records = cache.fetch_all(&remote, false).unwrap();

        assert_eq!(records.len(), 12);
        assert_eq!(remote.list_requests(ResourceKind::Group), 4);
        assert_index_in_sync(&cache);
    }

    #[test]
    fn populated_cache_is_reused() {
        let remote = MemoryRemote::new(4).with_records(ResourceKind::Group, None, groups(5));
        let mut cache = ResourceCache::new(ResourceKind::Group);

        cache.fetch_all(&remote, true).unwrap();
        cache.fetch_all(&remote, true).unwrap();
        cache.fetch_all(&remote, true).unwrap();

        assert_eq!(remote.list_requests(ResourceKind::Group), 3);
    }

    #[test]
    fn empty_collection_is_populated() {
        let remote = MemoryRemote::new(4);
        let mut cache = ResourceCache::new(ResourceKind::Namespace);

        assert!(!cache.is_populated());
        assert!(cache.fetch_all(&remote, true).unwrap().is_empty());
        assert!(cache.is_populated());
        assert!(cache.lookup_by_key("missing").is_none());

        cache.fetch_all(&remote, true).unwrap();
        assert_eq!(remote.list_requests(ResourceKind::Namespace), 1);
    }

    #[test]
    fn refresh_observes_a_shrinking_collection() {
        let remote = MemoryRemote::new(10).with_records(ResourceKind::Group, None, groups(3));
        let mut cache = ResourceCache::new(ResourceKind::Group);
        cache.fetch_all(&remote, false).unwrap();

        remote.remove(ResourceKind::Group, None, &RecordId::Int(2));
        cache.fetch_all(&remote, false).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup_by_id(&RecordId::Int(2)).is_none());
        assert_index_in_sync(&cache);
    }

    #[test]
    fn failed_refresh_keeps_previous_generation() {
        let remote = MemoryRemote::new(2).with_records(ResourceKind::Group, None, groups(5));
        let mut cache = ResourceCache::new(ResourceKind::Group);
        cache.fetch_all(&remote, false).unwrap();
        let before = cache.export().to_vec();

        remote.push(ResourceKind::Group, None, group(6, "g6"));
        remote.fail(Failure::ListAfter(2));
        let error = cache.fetch_all(&remote, false).unwrap_err();

        assert!(matches!(error, CacheError::Transport { page: 3, .. }));
        assert_eq!(cache.export(), before.as_slice());
        assert!(cache.is_populated());
        assert_index_in_sync(&cache);
    }

    #[test]
    fn failed_first_sweep_leaves_cache_unpopulated() {
        let remote = MemoryRemote::new(2).with_records(ResourceKind::Group, None, groups(3));
        remote.fail(Failure::ListAfter(1));
        let mut cache = ResourceCache::new(ResourceKind::Group);

        assert!(cache.fetch_all(&remote, true).is_err());
        assert!(!cache.is_populated());
        assert!(cache.is_empty());
    }

    #[test]
    fn record_without_id_aborts_sweep() {
        let remote = MemoryRemote::new(2).with_records(
            ResourceKind::Group,
            None,
            [group(1, "a"), Record::new().with("path", "b")],
        );
        let mut cache = ResourceCache::new(ResourceKind::Group);

        let error = cache.fetch_all(&remote, false).unwrap_err();

        assert!(matches!(error, CacheError::MissingId { page: 1, .. }));
        assert!(!cache.is_populated());
    }

    #[test]
    fn duplicate_ids_keep_first_occurrence() {
        let remote = MemoryRemote::new(2).with_records(
            ResourceKind::Group,
            None,
            [group(1, "a"), group(2, "b"), group(1, "shifted")],
        );
        let mut cache = ResourceCache::new(ResourceKind::Group);

        cache.fetch_all(&remote, false).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.lookup_by_id(&RecordId::Int(1)).unwrap().get_str("path"),
            Some("a")
        );
        assert_index_in_sync(&cache);
    }

    #[test]
    fn ambiguous_key_is_absent() {
        let remote = MemoryRemote::new(10).with_records(
            ResourceKind::User,
            None,
            [
                Record::new().with("id", 1i64).with("username", "alice"),
                Record::new().with("id", 2i64).with("username", "alice2"),
                Record::new().with("id", 3i64).with("username", "bob"),
            ],
        );
        let mut cache = ResourceCache::new(ResourceKind::User);
        cache.fetch_all(&remote, false).unwrap();

        assert!(cache.lookup_by_key("alice").is_none());
        assert_eq!(
            cache.lookup_by_key("bob").unwrap().id_for(ResourceKind::User),
            Some(RecordId::Int(3))
        );
    }

    #[test]
    fn insert_appends_and_replaces_in_place() {
        let remote = MemoryRemote::new(10).with_records(ResourceKind::Group, None, groups(2));
        let mut cache = ResourceCache::new(ResourceKind::Group);
        cache.fetch_all(&remote, false).unwrap();

        cache.insert(group(3, "new")).unwrap();
        cache.insert(group(1, "renamed")).unwrap();

        let paths: Vec<_> = cache
            .export()
            .iter()
            .filter_map(|record| record.get_str("path"))
            .collect();
        assert_eq!(paths, vec!["renamed", "g2", "new"]);
        assert!(cache.insert(Record::new().with("path", "no id")).is_none());
        assert_eq!(cache.len(), 3);
        assert_index_in_sync(&cache);
    }

    #[test]
    fn changes_are_visible_through_both_paths() {
        let remote = MemoryRemote::new(10).with_records(ResourceKind::Group, None, groups(2));
        let mut cache = ResourceCache::new(ResourceKind::Group);
        cache.fetch_all(&remote, false).unwrap();

        cache
            .lookup_by_id_mut(&RecordId::Int(2))
            .unwrap()
            .insert("description", "edited");

        assert_eq!(cache.export()[1].get_str("description"), Some("edited"));
    }
}
