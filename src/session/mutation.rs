//! Create and update operations.
//!
//! Every mutation resolves its references and checks its preconditions against the
//! caches before the remote service is called. A successful result is folded into
//! the owning cache; a failed call leaves every cache as it was.

use log::{info, warn};

use crate::{
    cache::ResourceCache,
    model::{flag, AccessLevel, FieldValue, Fields, FileEncoding, Record, RecordId, ResourceKind},
    remote::{RemoteApi, RemoteError},
};

use super::{Session, SessionError};

/// A user account to create.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub password: String,
    pub email: String,
    /// Number of projects the user may create, 0 when not given.
    pub projects_limit: Option<u32>,
    /// Defaults to `false`.
    pub can_create_group: Option<bool>,
    pub confirm: Option<bool>,
    pub admin: Option<bool>,
    pub skype: Option<String>,
    pub linkedin: Option<String>,
    pub twitter: Option<String>,
    pub website_url: Option<String>,
    pub bio: Option<String>,
    pub external: Option<bool>,
    pub extern_uid: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub username: Option<String>,
    pub name: Option<String>,
    pub external: Option<bool>,
}

/// A repository to create inside an existing namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepo {
    pub name: String,
    /// Path of the owning namespace.
    pub namespace: String,
    pub description: Option<String>,
    pub public: bool,
    pub issues: bool,
    pub snippets: bool,
    pub merge_requests: bool,
    pub wiki: bool,
    pub builds: bool,
}

impl NewRepo {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        NewRepo {
            name: name.into(),
            namespace: namespace.into(),
            description: None,
            public: false,
            issues: true,
            snippets: true,
            merge_requests: true,
            wiki: true,
            builds: true,
        }
    }

    fn path(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Content written to a file on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub repo: String,
    pub branch: String,
    pub path: String,
    pub content: String,
    pub commit_message: String,
    /// `text` or `base64`.
    pub encoding: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMilestone {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
}

fn set<V: Into<FieldValue>>(fields: &mut Fields, name: &str, value: V) {
    fields.insert(name.to_owned(), value.into());
}

fn set_opt<V: Into<FieldValue>>(fields: &mut Fields, name: &str, value: Option<V>) {
    if let Some(value) = value {
        set(fields, name, value);
    }
}

fn remote_failure(kind: ResourceKind) -> impl FnOnce(RemoteError) -> SessionError {
    move |error| {
        warn!("Remote operation on {} failed: {}", kind, error);
        SessionError::RemoteOperationFailed {
            kind,
            reason: error.to_string(),
        }
    }
}

fn access_level(value: &str) -> Result<AccessLevel, SessionError> {
    value
        .parse::<AccessLevel>()
        .map_err(|error| SessionError::PreconditionFailed(error.to_string()))
}

/// Folds a created record into its cache, or fails without touching the cache when
/// the record has no identity.
fn fold(cache: &mut ResourceCache, record: Record) -> Result<&Record, SessionError> {
    let kind = cache.kind();
    cache
        .insert(record)
        .ok_or_else(|| SessionError::RemoteOperationFailed {
            kind,
            reason: format!("result carries no `{}`", kind.id_field()),
        })
}

impl<R: RemoteApi> Session<R> {
    /// Creates a user unless one with the same username or email exists.
    pub fn add_user(&mut self, user: NewUser) -> Result<&Record, SessionError> {
        let taken = self.users.fetch_all(&self.remote, true)?.iter().any(|existing| {
            existing.get_str("username") == Some(user.username.as_str())
                || existing.get_str("email") == Some(user.email.as_str())
        });
        if taken {
            return Err(SessionError::PreconditionFailed(format!(
                "user {} or email {} already exists",
                user.username, user.email
            )));
        }

        let mut fields = Fields::new();
        set(&mut fields, "name", user.name);
        set(&mut fields, "username", user.username);
        set(&mut fields, "password", user.password);
        set(&mut fields, "email", user.email);
        set(&mut fields, "projects_limit", user.projects_limit.unwrap_or(0));
        set(
            &mut fields,
            "can_create_group",
            flag(user.can_create_group.unwrap_or(false)),
        );
        set_opt(&mut fields, "confirm", user.confirm.map(flag));
        set_opt(&mut fields, "admin", user.admin.map(flag));
        set_opt(&mut fields, "skype", user.skype);
        set_opt(&mut fields, "linkedin", user.linkedin);
        set_opt(&mut fields, "twitter", user.twitter);
        set_opt(&mut fields, "website_url", user.website_url);
        set_opt(&mut fields, "bio", user.bio);
        set_opt(&mut fields, "external", user.external.map(flag));
        set_opt(&mut fields, "extern_uid", user.extern_uid);
        set_opt(&mut fields, "provider", user.provider);

        let record = self
            .remote
            .create(ResourceKind::User, None, &fields)
            .map_err(remote_failure(ResourceKind::User))?;
        let record = fold(&mut self.users, record)?;
        info!("Created user {}", record.get_str("username").unwrap_or_default());
        Ok(record)
    }

    /// Changes username, full name or the external flag of the user matching `key`.
    pub fn mod_user(&mut self, key: &str, changes: UserChanges) -> Result<(), SessionError> {
        let user_id = self.user_id(key, true)?;

        let mut fields = Fields::new();
        set_opt(&mut fields, "username", changes.username);
        set_opt(&mut fields, "name", changes.name);
        set_opt(&mut fields, "external", changes.external.map(flag));
        if fields.is_empty() {
            return Ok(());
        }

        let updated = self
            .remote
            .update(ResourceKind::User, None, &user_id, &fields)
            .map_err(remote_failure(ResourceKind::User))?;
        if !updated {
            return Err(SessionError::RemoteOperationFailed {
                kind: ResourceKind::User,
                reason: format!("update of user {user_id} was refused"),
            });
        }

        if let Some(external) = changes.external {
            set(&mut fields, "external", external);
        }
        if let Some(cached) = self.users.lookup_by_id_mut(&user_id) {
            cached.merge(&fields);
        }
        Ok(())
    }

    /// Creates a repository in an existing namespace.
    pub fn add_repo(&mut self, repo: NewRepo) -> Result<&Record, SessionError> {
        let namespace_id = self.namespace_id(&repo.namespace, true)?;
        let path = repo.path();
        if self.has_repo(&path, true)? {
            return Err(SessionError::PreconditionFailed(format!(
                "repository {path} already exists"
            )));
        }

        let mut fields = Fields::new();
        set(&mut fields, "name", repo.name);
        set(&mut fields, "namespace_id", namespace_id);
        set_opt(&mut fields, "description", repo.description);
        set(&mut fields, "public", flag(repo.public));
        set(&mut fields, "issues_enabled", flag(repo.issues));
        set(&mut fields, "snippets_enabled", flag(repo.snippets));
        set(&mut fields, "merge_requests_enabled", flag(repo.merge_requests));
        set(&mut fields, "wiki_enabled", flag(repo.wiki));
        set(&mut fields, "builds_enabled", flag(repo.builds));

        let record = self
            .remote
            .create(ResourceKind::Repository, None, &fields)
            .map_err(remote_failure(ResourceKind::Repository))?;
        let record = fold(&mut self.repos, record)?;
        info!("Created repository {}", path);
        Ok(record)
    }

    /// Branches `new_branch` off `source_branch`.
    pub fn add_branch(
        &mut self,
        repo_path: &str,
        new_branch: &str,
        source_branch: &str,
    ) -> Result<&Record, SessionError> {
        let repo_id = self.repo_id(repo_path, true)?;
        let branches = self.branches.populated(&self.remote, &repo_id, true)?;
        if branches.contains_id(&RecordId::from(new_branch)) {
            return Err(SessionError::PreconditionFailed(format!(
                "branch {new_branch} already exists in {repo_path}"
            )));
        }
        if !branches.contains_id(&RecordId::from(source_branch)) {
            return Err(SessionError::PreconditionFailed(format!(
                "branch {source_branch} does not exist in {repo_path}"
            )));
        }

        let mut fields = Fields::new();
        set(&mut fields, "branch_name", new_branch);
        set(&mut fields, "ref", source_branch);

        let record = self
            .remote
            .create(ResourceKind::Branch, Some(&repo_id), &fields)
            .map_err(remote_failure(ResourceKind::Branch))?;
        let record = fold(branches, record)?;
        info!("Created branch {} in {}", new_branch, repo_path);
        Ok(record)
    }

    /// Protects or unprotects an existing branch.
    pub fn mod_branch(
        &mut self,
        repo_path: &str,
        branch: &str,
        protect: bool,
    ) -> Result<&Record, SessionError> {
        let repo_id = self.repo_id(repo_path, true)?;
        self.require_branch(&repo_id, repo_path, branch, true)?;

        let record = self
            .remote
            .set_branch_protection(&repo_id, branch, protect)
            .map_err(remote_failure(ResourceKind::Branch))?;
        fold(self.branches.populated(&self.remote, &repo_id, true)?, record)
    }

    /// Grants the user matching `user_key` access to a repository.
    ///
    /// `access` is one of guest, reporter, developer or master.
    pub fn add_member(
        &mut self,
        repo_path: &str,
        user_key: &str,
        access: &str,
    ) -> Result<&Record, SessionError> {
        let access = access_level(access)?;
        let repo_id = self.repo_id(repo_path, true)?;
        let user_id = self.user_id(user_key, true)?;
        let members = self.members.populated(&self.remote, &repo_id, true)?;
        if members.contains_id(&user_id) {
            return Err(SessionError::PreconditionFailed(format!(
                "user {user_key} is already a member of {repo_path}"
            )));
        }

        let mut fields = Fields::new();
        set(&mut fields, "user_id", user_id);
        set(&mut fields, "access_level", access.level());

        let record = self
            .remote
            .create(ResourceKind::Member, Some(&repo_id), &fields)
            .map_err(remote_failure(ResourceKind::Member))?;
        let record = fold(members, record)?;
        info!("Added {} to {} as {}", user_key, repo_path, access);
        Ok(record)
    }

    /// Shares a repository with a group at the given access level.
    pub fn share_with_group(
        &mut self,
        repo_path: &str,
        group_path: &str,
        access: &str,
    ) -> Result<Record, SessionError> {
        let access = access_level(access)?;
        let repo_id = self.repo_id(repo_path, true)?;
        let group_id = self.group_id(group_path, true)?;

        let mut fields = Fields::new();
        set(&mut fields, "group_id", group_id);
        set(&mut fields, "group_access", access.level());

        let record = self
            .remote
            .create(ResourceKind::GroupShare, Some(&repo_id), &fields)
            .map_err(remote_failure(ResourceKind::GroupShare))?;
        info!("Shared {} with {} as {}", repo_path, group_path, access);
        Ok(record)
    }

    /// Creates a file that does not exist yet on the branch.
    pub fn add_file(&mut self, file: NewFile) -> Result<Record, SessionError> {
        let (repo_id, encoding) = self.prepare_file(&file)?;
        if self
            .remote
            .get_file(&repo_id, &file.branch, &file.path)
            .map_err(remote_failure(ResourceKind::File))?
            .is_some()
        {
            return Err(SessionError::PreconditionFailed(format!(
                "file {} already exists on {} in {}",
                file.path, file.branch, file.repo
            )));
        }

        self.create_file(&repo_id, file, encoding)
    }

    /// Writes a file, updating it when present on the branch and creating it otherwise.
    pub fn mod_file(&mut self, file: NewFile) -> Result<(), SessionError> {
        let (repo_id, encoding) = self.prepare_file(&file)?;
        let existing = self
            .remote
            .get_file(&repo_id, &file.branch, &file.path)
            .map_err(remote_failure(ResourceKind::File))?;
        if existing.is_none() {
            return self.create_file(&repo_id, file, encoding).map(|_| ());
        }

        let path = RecordId::from(file.path.as_str());
        let fields = file_fields(file, encoding);
        let updated = self
            .remote
            .update(ResourceKind::File, Some(&repo_id), &path, &fields)
            .map_err(remote_failure(ResourceKind::File))?;
        if updated {
            Ok(())
        } else {
            Err(SessionError::RemoteOperationFailed {
                kind: ResourceKind::File,
                reason: format!("update of {path} was refused"),
            })
        }
    }

    /// Adds a milestone to a repository.
    pub fn add_milestone(
        &mut self,
        repo_path: &str,
        milestone: NewMilestone,
    ) -> Result<Record, SessionError> {
        if milestone.title.trim().is_empty() {
            return Err(SessionError::PreconditionFailed(
                "milestone title is empty".to_owned(),
            ));
        }
        let repo_id = self.repo_id(repo_path, true)?;

        let mut fields = Fields::new();
        set(&mut fields, "title", milestone.title);
        set_opt(&mut fields, "description", milestone.description);
        set_opt(&mut fields, "due_date", milestone.due_date);

        self.remote
            .create(ResourceKind::Milestone, Some(&repo_id), &fields)
            .map_err(remote_failure(ResourceKind::Milestone))
    }

    fn prepare_file(&mut self, file: &NewFile) -> Result<(RecordId, FileEncoding), SessionError> {
        let repo_id = self.repo_id(&file.repo, true)?;
        self.require_branch(&repo_id, &file.repo, &file.branch, true)?;
        let encoding = file
            .encoding
            .parse::<FileEncoding>()
            .map_err(|error| SessionError::PreconditionFailed(error.to_string()))?;
        Ok((repo_id, encoding))
    }

    fn create_file(
        &mut self,
        repo_id: &RecordId,
        file: NewFile,
        encoding: FileEncoding,
    ) -> Result<Record, SessionError> {
        let description = format!("{} on {} in {}", file.path, file.branch, file.repo);
        let fields = file_fields(file, encoding);
        let record = self
            .remote
            .create(ResourceKind::File, Some(repo_id), &fields)
            .map_err(remote_failure(ResourceKind::File))?;
        info!("Created file {}", description);
        Ok(record)
    }
}

fn file_fields(file: NewFile, encoding: FileEncoding) -> Fields {
    let mut fields = Fields::new();
    set(&mut fields, "file_path", file.path);
    set(&mut fields, "branch_name", file.branch);
    set(&mut fields, "encoding", encoding.to_string());
    set(&mut fields, "content", file.content);
    set(&mut fields, "commit_message", file.commit_message);
    fields
}
