#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! This crate provides the client-side plumbing for polling-based Kubernetes
//! service discovery: resolving a declarative [`DiscoveryConfig`] into an
//! authenticated, pooled HTTP client bound to the cluster API server, and
//! executing the listing requests a discovery loop issues on every poll.
//!
//! Resolution is expensive (credential files, TLS trust, connection pool), so
//! it runs at most once per distinct configuration: [`ContextCache`] memoizes
//! the resolved context by the configuration's value identity and guarantees
//! single-flight construction under concurrent first access.
//!
//! When no API server is configured, credentials are bootstrapped from the
//! pod environment: the `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT`
//! env vars plus the well-known service account CA and token files.
//!
//! # Example
//!
//! ```no_run
//! use kube_discovery::{ContextCache, DiscoveryConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ContextCache::new();
//!
//! let config = DiscoveryConfig {
//!     api_server: Some("https://10.0.0.1:6443".into()),
//!     bearer_token: Some("secret".into()),
//!     ..DiscoveryConfig::default()
//! };
//!
//! // First call builds credentials and the pooled client; later calls with a
//! // field-wise equal config return the same shared context.
//! let context = cache.resolve(&config).await?;
//!
//! let pods = context.fetch_api_response("pod", "/api/v1/pods").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **`tracing`**: emit internal diagnostics through `tracing`
//! - **`logging`**: emit internal diagnostics through `log`

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod constants;
pub mod context;
pub mod fetch;
pub mod resolver;

mod client;
mod observability;
mod prelude;

// -----------------------
// Re-exports
// -----------------------

pub use crate::bootstrap::{BootstrapSource, ProcessEnvironment};
pub use crate::cache::{ConfigCache, ContextCache};
pub use crate::config::{BasicAuthConfig, DiscoveryConfig, Selector, TlsConfig};
pub use crate::context::ResolvedContext;
pub use crate::fetch::FetchError;
pub use crate::resolver::{ResolveError, ResolvedCredentials, TlsMaterial};
