//! The resolved, shareable per-configuration context.

use std::fmt;

use reqwest::Client;
use url::Url;

use crate::bootstrap::BootstrapSource;
use crate::client::build_client;
use crate::config::{DiscoveryConfig, Selector};
use crate::resolver::{resolve_credentials, ResolveError};

/// Fully resolved state for one [`DiscoveryConfig`] identity.
///
/// Bundles the pooled client, the canonical server address and the
/// authorization material. Built once per identity by
/// [`crate::ContextCache::resolve`], then shared read-only (as
/// `Arc<ResolvedContext>`) by every poller using that configuration; it holds
/// no caller-specific mutable state. Credential rotation requires a new
/// configuration identity or an explicit cache invalidation.
pub struct ResolvedContext {
    pub(crate) client: Client,
    pub(crate) api_server: Url,
    pub(crate) host_port: String,
    pub(crate) authorization: Option<String>,
    pub(crate) namespaces: Vec<String>,
    pub(crate) selectors: Vec<Selector>,
}

impl ResolvedContext {
    /// Resolves credentials and builds the pooled client for `config`.
    ///
    /// Reads env vars and credential files through `source`; no network I/O
    /// is performed.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] if credential resolution fails or the
    /// client cannot be constructed.
    pub fn new(
        config: &DiscoveryConfig,
        source: &dyn BootstrapSource,
    ) -> Result<Self, ResolveError> {
        let credentials = resolve_credentials(config, source)?;
        let client = build_client(&credentials.tls)?;

        Ok(Self {
            client,
            api_server: credentials.api_server,
            host_port: credentials.host_port,
            authorization: credentials.authorization,
            namespaces: config.namespaces.clone(),
            selectors: config.selectors.clone(),
        })
    }

    /// Canonical API server URL.
    pub fn api_server(&self) -> &Url {
        &self.api_server
    }

    /// `host:port` authority of the API server.
    pub fn host_port(&self) -> &str {
        &self.host_port
    }

    /// Namespace restrictions applied to every fetch.
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Configured per-role selectors.
    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }
}

// The authorization header is credential material; keep it out of Debug output.
impl fmt::Debug for ResolvedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedContext")
            .field("api_server", &self.api_server.as_str())
            .field("host_port", &self.host_port)
            .field("namespaces", &self.namespaces)
            .field("selectors", &self.selectors)
            .finish_non_exhaustive()
    }
}
