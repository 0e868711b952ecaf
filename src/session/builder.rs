use anyhow::anyhow;

use crate::{config::LabcacheConfig, remote::RemoteApi};

use super::Session;

pub struct SessionBuilder<R> {
    remote: Option<R>,
    config: Option<LabcacheConfig>,
}

impl<R> Default for SessionBuilder<R> {
    fn default() -> Self {
        SessionBuilder {
            remote: None,
            config: None,
        }
    }
}

impl<R: RemoteApi> SessionBuilder<R> {
    /// Client used for every page request and mutation of the session.
    pub fn remote(mut self, remote: R) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Configuration of the session.
    ///
    /// Defaults to [`LabcacheConfig::load`].
    pub fn config(mut self, config: LabcacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn try_build(self) -> anyhow::Result<Session<R>> {
        let Self { remote, config } = self;
        let remote = remote.ok_or_else(|| anyhow!("A remote API client is required"))?;
        let config = match config {
            Some(config) => config,
            None => LabcacheConfig::load()?,
        };
        Ok(Session::new(remote, config))
    }
}
