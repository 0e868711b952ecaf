use std::collections::{hash_map::Entry, HashMap};

use crate::{
    model::{Record, RecordId, ResourceKind},
    remote::RemoteApi,
};

use super::{CacheError, ResourceCache, Termination};

/// Collections scoped under a parent repository, one [`ResourceCache`] per parent id.
///
/// Callers hand in parent ids they already resolved against the repository cache;
/// an entry is only ever created for such an id.
#[derive(Debug, Clone)]
pub struct DependentCache {
    kind: ResourceKind,
    termination: Termination,
    entries: HashMap<RecordId, ResourceCache>,
}

impl DependentCache {
    pub fn new(kind: ResourceKind, termination: Termination) -> Self {
        DependentCache {
            kind,
            termination,
            entries: HashMap::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn fetch_all<R>(
        &mut self,
        remote: &R,
        parent: &RecordId,
        use_cache: bool,
    ) -> Result<&[Record], CacheError>
    where
        R: RemoteApi + ?Sized,
    {
        Ok(self.populated(remote, parent, use_cache)?.export())
    }

    /// The collection of `parent`, if it was ever fetched successfully.
    pub fn get(&self, parent: &RecordId) -> Option<&ResourceCache> {
        self.entries.get(parent)
    }

    /// The collection of `parent` after [`ResourceCache::fetch_all`].
    ///
    /// A parent is only registered once its first sweep succeeded.
    pub(crate) fn populated<R>(
        &mut self,
        remote: &R,
        parent: &RecordId,
        use_cache: bool,
    ) -> Result<&mut ResourceCache, CacheError>
    where
        R: RemoteApi + ?Sized,
    {
        match self.entries.entry(parent.clone()) {
            Entry::Occupied(entry) => {
                let cache = entry.into_mut();
                cache.fetch_all(remote, use_cache)?;
                Ok(cache)
            }
            Entry::Vacant(entry) => {
                let mut cache = ResourceCache::with_termination(
                    self.kind,
                    Some(parent.clone()),
                    self.termination,
                );
                cache.fetch_all(remote, use_cache)?;
                Ok(entry.insert(cache))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::num::NonZeroU32;

    use crate::remote::{Failure, MemoryRemote};

    use pretty_assertions::assert_eq;

    fn member(id: i64) -> Record {
        Record::new().with("id", id).with("username", format!("user{id}"))
    }

    fn members(remote: MemoryRemote, repo: i64, count: i64) -> MemoryRemote {
        remote.with_records(
            ResourceKind::Member,
            Some(RecordId::Int(repo)),
            (1..=count).map(member),
        )
    }

    #[test]
    fn short_page_ends_sweep() {
        let remote = members(MemoryRemote::new(100), 1, 25);
        let mut cache = DependentCache::new(
            ResourceKind::Member,
            Termination::ShortPage {
                per_page: NonZeroU32::new(10).unwrap(),
            },
        );

        let records = cache.fetch_all(&remote, &RecordId::Int(1), false).unwrap();

        assert_eq!(records.len(), 25);
        assert_eq!(remote.list_requests(ResourceKind::Member), 3);
    }

    #[test]
    fn full_last_page_needs_one_more_request() {
        let remote = members(MemoryRemote::new(100), 1, 30);
        let mut cache = DependentCache::new(
            ResourceKind::Member,
            Termination::ShortPage {
                per_page: NonZeroU32::new(10).unwrap(),
            },
        );

        let records = cache.fetch_all(&remote, &RecordId::Int(1), false).unwrap();

        assert_eq!(records.len(), 30);
        assert_eq!(remote.list_requests(ResourceKind::Member), 4);
    }

    #[test]
    fn parents_are_cached_independently() {
        let remote = members(members(MemoryRemote::new(100), 1, 2), 2, 5);
        let mut cache = DependentCache::new(
            ResourceKind::Member,
            Termination::ShortPage {
                per_page: NonZeroU32::new(10).unwrap(),
            },
        );

        assert_eq!(cache.fetch_all(&remote, &RecordId::Int(1), true).unwrap().len(), 2);
        assert_eq!(cache.fetch_all(&remote, &RecordId::Int(2), true).unwrap().len(), 5);
        cache.fetch_all(&remote, &RecordId::Int(1), true).unwrap();

        assert_eq!(remote.list_requests(ResourceKind::Member), 2);
        assert!(cache.get(&RecordId::Int(3)).is_none());
        assert!(cache
            .get(&RecordId::Int(2))
            .unwrap()
            .contains_id(&RecordId::Int(5)));
    }

    #[test]
    fn branches_stop_at_empty_page() {
        let remote = MemoryRemote::new(2).with_records(
            ResourceKind::Branch,
            Some(RecordId::Int(7)),
            [
                Record::new().with("name", "main"),
                Record::new().with("name", "develop"),
            ],
        );
        let mut cache = DependentCache::new(ResourceKind::Branch, Termination::EmptyPage);

        cache.fetch_all(&remote, &RecordId::Int(7), false).unwrap();

        assert_eq!(remote.list_requests(ResourceKind::Branch), 2);
        let branches = cache.get(&RecordId::Int(7)).unwrap();
        assert!(branches.lookup_by_key("develop").is_some());
        assert!(branches.contains_id(&RecordId::from("main")));
    }

    #[test]
    fn failed_first_sweep_registers_no_parent() {
        let remote = members(MemoryRemote::new(100), 1, 3);
        remote.fail(Failure::ListAfter(0));
        let mut cache = DependentCache::new(ResourceKind::Member, Termination::EmptyPage);

        assert!(cache.fetch_all(&remote, &RecordId::Int(1), true).is_err());

        assert!(cache.get(&RecordId::Int(1)).is_none());
    }

    #[test]
    fn failed_refresh_keeps_previous_generation() {
        let remote = members(MemoryRemote::new(100), 1, 3);
        let mut cache = DependentCache::new(
            ResourceKind::Member,
            Termination::ShortPage {
                per_page: NonZeroU32::new(2).unwrap(),
            },
        );
        cache.fetch_all(&remote, &RecordId::Int(1), true).unwrap();
        remote.push(ResourceKind::Member, Some(RecordId::Int(1)), member(4));
        remote.fail(Failure::ListAfter(1));

        let error = cache.fetch_all(&remote, &RecordId::Int(1), false).unwrap_err();

        assert!(matches!(error, CacheError::Transport { page: 2, .. }));
        let members = cache.get(&RecordId::Int(1)).unwrap();
        assert!(members.is_populated());
        assert_eq!(members.len(), 3);
        assert!(!members.contains_id(&RecordId::Int(4)));
    }
}
