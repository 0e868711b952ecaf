//! The resource cache manager.
//!
//! A [`Session`] owns one cache per resource kind and the client they are filled
//! from. Lookups populate their cache lazily on first use, or sweep again when
//! asked not to use the cache. Mutations live in [`mutation`].

mod builder;
pub mod mutation;

use log::debug;
use thiserror::Error;

use crate::{
    cache::{CacheError, DependentCache, ResourceCache, Termination},
    config::LabcacheConfig,
    model::{Record, RecordId, ResourceKind},
    remote::RemoteApi,
};

pub use builder::SessionBuilder;
pub use mutation::{NewFile, NewMilestone, NewRepo, NewUser, UserChanges};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{kind} `{key}` does not resolve to exactly one record")]
    ReferenceNotFound { kind: ResourceKind, key: String },
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Remote operation on {kind} failed: {reason}")]
    RemoteOperationFailed { kind: ResourceKind, reason: String },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub struct Session<R> {
    remote: R,
    config: LabcacheConfig,
    users: ResourceCache,
    groups: ResourceCache,
    namespaces: ResourceCache,
    repos: ResourceCache,
    branches: DependentCache,
    members: DependentCache,
}

impl<R> Session<R> {
    pub fn builder() -> SessionBuilder<R> {
        SessionBuilder::default()
    }
}

impl<R: RemoteApi> Session<R> {
    pub fn new(remote: R, config: LabcacheConfig) -> Self {
        let members = DependentCache::new(
            ResourceKind::Member,
            Termination::ShortPage {
                per_page: config.member_page_size,
            },
        );
        Session {
            remote,
            config,
            users: ResourceCache::new(ResourceKind::User),
            groups: ResourceCache::new(ResourceKind::Group),
            namespaces: ResourceCache::new(ResourceKind::Namespace),
            repos: ResourceCache::new(ResourceKind::Repository),
            branches: DependentCache::new(ResourceKind::Branch, Termination::EmptyPage),
            members,
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn config(&self) -> &LabcacheConfig {
        &self.config
    }

    /// Sweeps users, groups, namespaces and repositories again, in that order.
    pub fn sync(&mut self) -> Result<(), SessionError> {
        self.users.fetch_all(&self.remote, false)?;
        self.groups.fetch_all(&self.remote, false)?;
        self.namespaces.fetch_all(&self.remote, false)?;
        self.repos.fetch_all(&self.remote, false)?;
        Ok(())
    }

    // Users

    pub fn users(&mut self, use_cache: bool) -> Result<&[Record], SessionError> {
        Ok(self.users.fetch_all(&self.remote, use_cache)?)
    }

    /// Finds the single user whose username or email contains `key`.
    pub fn user(&mut self, key: &str, use_cache: bool) -> Result<Option<&Record>, SessionError> {
        find(&mut self.users, &self.remote, key, use_cache)
    }

    pub fn user_id(&mut self, key: &str, use_cache: bool) -> Result<RecordId, SessionError> {
        resolve(&mut self.users, &self.remote, key, use_cache)
    }

    pub fn user_by_id(&self, id: &RecordId) -> Option<&Record> {
        self.users.lookup_by_id(id)
    }

    pub fn has_user(&mut self, key: &str, use_cache: bool) -> Result<bool, SessionError> {
        Ok(self.user(key, use_cache)?.is_some())
    }

    pub fn user_cache(&self) -> &ResourceCache {
        &self.users
    }

    // Groups

    pub fn groups(&mut self, use_cache: bool) -> Result<&[Record], SessionError> {
        Ok(self.groups.fetch_all(&self.remote, use_cache)?)
    }

    pub fn group(&mut self, path: &str, use_cache: bool) -> Result<Option<&Record>, SessionError> {
        find(&mut self.groups, &self.remote, path, use_cache)
    }

    pub fn group_id(&mut self, path: &str, use_cache: bool) -> Result<RecordId, SessionError> {
        resolve(&mut self.groups, &self.remote, path, use_cache)
    }

    pub fn group_by_id(&self, id: &RecordId) -> Option<&Record> {
        self.groups.lookup_by_id(id)
    }

    pub fn has_group(&mut self, path: &str, use_cache: bool) -> Result<bool, SessionError> {
        Ok(self.group(path, use_cache)?.is_some())
    }

    pub fn group_cache(&self) -> &ResourceCache {
        &self.groups
    }

    // Namespaces

    pub fn namespaces(&mut self, use_cache: bool) -> Result<&[Record], SessionError> {
        Ok(self.namespaces.fetch_all(&self.remote, use_cache)?)
    }

    pub fn namespace(
        &mut self,
        path: &str,
        use_cache: bool,
    ) -> Result<Option<&Record>, SessionError> {
        find(&mut self.namespaces, &self.remote, path, use_cache)
    }

    pub fn namespace_id(&mut self, path: &str, use_cache: bool) -> Result<RecordId, SessionError> {
        resolve(&mut self.namespaces, &self.remote, path, use_cache)
    }

    pub fn namespace_by_id(&self, id: &RecordId) -> Option<&Record> {
        self.namespaces.lookup_by_id(id)
    }

    pub fn has_namespace(&mut self, path: &str, use_cache: bool) -> Result<bool, SessionError> {
        Ok(self.namespace(path, use_cache)?.is_some())
    }

    pub fn namespace_cache(&self) -> &ResourceCache {
        &self.namespaces
    }

    // Repositories

    pub fn repos(&mut self, use_cache: bool) -> Result<&[Record], SessionError> {
        Ok(self.repos.fetch_all(&self.remote, use_cache)?)
    }

    /// Finds a repository by its `namespace/name` path.
    pub fn repo(&mut self, path: &str, use_cache: bool) -> Result<Option<&Record>, SessionError> {
        find(&mut self.repos, &self.remote, path, use_cache)
    }

    pub fn repo_id(&mut self, path: &str, use_cache: bool) -> Result<RecordId, SessionError> {
        resolve(&mut self.repos, &self.remote, path, use_cache)
    }

    pub fn repo_by_id(&self, id: &RecordId) -> Option<&Record> {
        self.repos.lookup_by_id(id)
    }

    pub fn has_repo(&mut self, path: &str, use_cache: bool) -> Result<bool, SessionError> {
        Ok(self.repo(path, use_cache)?.is_some())
    }

    pub fn repo_cache(&self) -> &ResourceCache {
        &self.repos
    }

    // Branches

    pub fn branches(&mut self, repo_path: &str, use_cache: bool) -> Result<&[Record], SessionError> {
        let repo_id = self.repo_id(repo_path, use_cache)?;
        Ok(self.branches.fetch_all(&self.remote, &repo_id, use_cache)?)
    }

    pub fn branch(
        &mut self,
        repo_path: &str,
        name: &str,
        use_cache: bool,
    ) -> Result<Option<&Record>, SessionError> {
        let repo_id = self.repo_id(repo_path, use_cache)?;
        let branches = self.branches.populated(&self.remote, &repo_id, use_cache)?;
        Ok(branches.lookup_by_id(&RecordId::from(name)))
    }

    pub fn has_branch(
        &mut self,
        repo_path: &str,
        name: &str,
        use_cache: bool,
    ) -> Result<bool, SessionError> {
        Ok(self.branch(repo_path, name, use_cache)?.is_some())
    }

    pub fn branch_cache(&self) -> &DependentCache {
        &self.branches
    }

    // Members

    pub fn members(&mut self, repo_path: &str, use_cache: bool) -> Result<&[Record], SessionError> {
        let repo_id = self.repo_id(repo_path, use_cache)?;
        Ok(self.members.fetch_all(&self.remote, &repo_id, use_cache)?)
    }

    /// Whether the user resolved from `user_key` is a member of the repository.
    pub fn has_member(
        &mut self,
        repo_path: &str,
        user_key: &str,
        use_cache: bool,
    ) -> Result<bool, SessionError> {
        let repo_id = self.repo_id(repo_path, use_cache)?;
        let user_id = self.user_id(user_key, use_cache)?;
        let members = self.members.populated(&self.remote, &repo_id, use_cache)?;
        Ok(members.contains_id(&user_id))
    }

    pub fn member_cache(&self) -> &DependentCache {
        &self.members
    }

    // Files

    /// Fetches a file from a branch. Files are not cached.
    pub fn file(
        &mut self,
        repo_path: &str,
        branch: &str,
        path: &str,
        use_cache: bool,
    ) -> Result<Option<Record>, SessionError> {
        let repo_id = self.repo_id(repo_path, use_cache)?;
        self.require_branch(&repo_id, repo_path, branch, use_cache)?;
        self.remote
            .get_file(&repo_id, branch, path)
            .map_err(|error| SessionError::RemoteOperationFailed {
                kind: ResourceKind::File,
                reason: error.to_string(),
            })
    }

    pub fn has_file(
        &mut self,
        repo_path: &str,
        branch: &str,
        path: &str,
        use_cache: bool,
    ) -> Result<bool, SessionError> {
        Ok(self.file(repo_path, branch, path, use_cache)?.is_some())
    }

    fn require_branch(
        &mut self,
        repo_id: &RecordId,
        repo_path: &str,
        branch: &str,
        use_cache: bool,
    ) -> Result<(), SessionError> {
        let branches = self.branches.populated(&self.remote, repo_id, use_cache)?;
        if branches.contains_id(&RecordId::from(branch)) {
            Ok(())
        } else {
            Err(SessionError::PreconditionFailed(format!(
                "branch {branch} does not exist in {repo_path}"
            )))
        }
    }
}

fn find<'c, R>(
    cache: &'c mut ResourceCache,
    remote: &R,
    key: &str,
    use_cache: bool,
) -> Result<Option<&'c Record>, SessionError>
where
    R: RemoteApi + ?Sized,
{
    cache.fetch_all(remote, use_cache)?;
    Ok(cache.lookup_by_key(key))
}

fn resolve<R>(
    cache: &mut ResourceCache,
    remote: &R,
    key: &str,
    use_cache: bool,
) -> Result<RecordId, SessionError>
where
    R: RemoteApi + ?Sized,
{
    let kind = cache.kind();
    match find(cache, remote, key, use_cache)?.and_then(|record| record.id_for(kind)) {
        Some(id) => Ok(id),
        None => {
            debug!("Could not resolve {} {}", kind, key);
            Err(SessionError::ReferenceNotFound {
                kind,
                key: key.to_owned(),
            })
        }
    }
}
