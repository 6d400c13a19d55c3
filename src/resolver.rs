//! Credential resolution.
//!
//! Turns a [`DiscoveryConfig`] into the concrete material a poller needs: the
//! canonical API server URL, its `host:port` authority, an `Authorization`
//! header value, and the TLS trust/identity bytes the client is built with.
//!
//! With an explicit `api_server`, everything derives from the config. Without
//! one the process is assumed to run inside the cluster and the address and
//! credentials are bootstrapped from the service account environment (see
//! [`crate::constants`]).

use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use thiserror::Error;
use url::Url;

use crate::bootstrap::BootstrapSource;
use crate::config::{DiscoveryConfig, TlsConfig};
use crate::constants::{
    SERVICE_ACCOUNT_CA_PATH, SERVICE_ACCOUNT_TOKEN_PATH, SERVICE_HOST_ENV, SERVICE_PORT_ENV,
};
use crate::prelude::debug;

/// Errors produced while resolving a [`DiscoveryConfig`].
///
/// `MissingEnvVar` and `ReadFile` indicate an environment that is not (yet)
/// ready — e.g. a token file that has not been mounted — and are worth
/// retrying on a later poll. The remaining variants are configuration errors
/// that will not go away without an operator change. None of them are cached:
/// a later [`crate::ContextCache::resolve`] call re-attempts construction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// A required in-cluster bootstrap env var is not set.
    #[error("cannot find {name} env var; it must be defined when running inside a cluster; is api_server missing from the discovery config?")]
    MissingEnvVar {
        /// Name of the missing env var.
        name: &'static str,
    },

    /// A credential file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    ReadFile {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The configured `api_server` is not a valid URL.
    #[error("cannot parse api_server {url:?}: {source}")]
    InvalidApiServer {
        /// The offending URL string.
        url: String,
        /// Underlying parse error.
        source: url::ParseError,
    },

    /// The configured `api_server` has no host component.
    #[error("api_server {url:?} has no host")]
    MissingHost {
        /// The offending URL string.
        url: String,
    },

    /// Basic auth was configured without a username.
    #[error("basic_auth requires a non-empty username")]
    MissingBasicAuthUsername,

    /// More than one authorization method was configured.
    #[error("at most one of basic_auth, bearer_token and bearer_token_file can be configured")]
    MultipleAuthMethods,

    /// A client certificate was configured without its key, or vice versa.
    #[error("cert_file and key_file must both be set to use a client certificate")]
    IncompleteClientIdentity,

    /// The CA certificate could not be parsed as PEM.
    #[error("cannot parse CA certificate: {source}")]
    InvalidCaCertificate {
        /// Underlying parse error.
        source: reqwest::Error,
    },

    /// The client certificate/key pair could not be parsed as PEM.
    #[error("cannot parse client certificate and key: {source}")]
    InvalidClientIdentity {
        /// Underlying parse error.
        source: reqwest::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("cannot build HTTP client: {0}")]
    BuildClient(#[from] reqwest::Error),
}

/// TLS trust and identity material resolved for one API server.
///
/// Raw PEM bytes; parsing is deferred to client construction.
#[derive(Debug, Clone, Default)]
pub struct TlsMaterial {
    /// CA certificate bundle (PEM) to trust, if any.
    pub ca_pem: Option<Vec<u8>>,

    /// Client certificate followed by its private key (PEM), if any.
    pub identity_pem: Option<Vec<u8>>,

    /// Skip server certificate verification.
    pub accept_invalid_certs: bool,
}

/// Everything credential resolution produces for one configuration.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    /// Canonical API server URL.
    pub api_server: Url,

    /// `host:port` authority of the API server (IPv6 hosts bracketed).
    pub host_port: String,

    /// Value for the `Authorization` header, if any.
    pub authorization: Option<String>,

    /// TLS material for `https` servers.
    pub tls: TlsMaterial,
}

/// Resolves `config` into concrete credentials.
///
/// Reads env vars and credential files through `source`; apart from those
/// reads the result is purely derived from the inputs.
///
/// # Errors
///
/// Returns a [`ResolveError`] if the configuration is malformed or, in
/// bootstrap mode, if the in-cluster environment is incomplete.
pub fn resolve_credentials(
    config: &DiscoveryConfig,
    source: &dyn BootstrapSource,
) -> Result<ResolvedCredentials, ResolveError> {
    match config.api_server.as_deref().filter(|s| !s.is_empty()) {
        Some(api_server) => resolve_explicit(api_server, config, source),
        None => resolve_in_cluster(source),
    }
}

fn resolve_explicit(
    api_server: &str,
    config: &DiscoveryConfig,
    source: &dyn BootstrapSource,
) -> Result<ResolvedCredentials, ResolveError> {
    let url = Url::parse(api_server).map_err(|source| ResolveError::InvalidApiServer {
        url: api_server.to_owned(),
        source,
    })?;

    let host = url.host_str().ok_or_else(|| ResolveError::MissingHost {
        url: api_server.to_owned(),
    })?;
    let is_tls = url.scheme() == "https";
    let port = url.port().unwrap_or(if is_tls { 443 } else { 80 });
    let host_port = format!("{host}:{port}");

    let authorization = authorization_header(config, source)?;

    // The original behavior: TLS settings only apply to https servers.
    let tls = if is_tls {
        tls_material(config.tls_config.as_ref(), source)?
    } else {
        TlsMaterial::default()
    };

    Ok(ResolvedCredentials {
        api_server: url,
        host_port,
        authorization,
        tls,
    })
}

fn resolve_in_cluster(source: &dyn BootstrapSource) -> Result<ResolvedCredentials, ResolveError> {
    let host = source
        .env_var(SERVICE_HOST_ENV)
        .ok_or(ResolveError::MissingEnvVar {
            name: SERVICE_HOST_ENV,
        })?;
    let port = source
        .env_var(SERVICE_PORT_ENV)
        .ok_or(ResolveError::MissingEnvVar {
            name: SERVICE_PORT_ENV,
        })?;

    let host_port = join_host_port(&host, &port);
    let server = format!("https://{host_port}");
    let api_server = Url::parse(&server).map_err(|source| ResolveError::InvalidApiServer {
        url: server.clone(),
        source,
    })?;

    debug!("bootstrapping discovery credentials from the in-cluster environment; api server {server}");

    let ca_pem = read_credential_file(source, Path::new(SERVICE_ACCOUNT_CA_PATH))?;
    let token = read_credential_file(source, Path::new(SERVICE_ACCOUNT_TOKEN_PATH))?;
    let token = String::from_utf8_lossy(&token).trim().to_owned();

    Ok(ResolvedCredentials {
        api_server,
        host_port,
        authorization: Some(format!("Bearer {token}")),
        tls: TlsMaterial {
            ca_pem: Some(ca_pem),
            identity_pem: None,
            accept_invalid_certs: false,
        },
    })
}

fn authorization_header(
    config: &DiscoveryConfig,
    source: &dyn BootstrapSource,
) -> Result<Option<String>, ResolveError> {
    let methods = [
        config.basic_auth.is_some(),
        config.bearer_token.is_some(),
        config.bearer_token_file.is_some(),
    ];
    if methods.iter().filter(|set| **set).count() > 1 {
        return Err(ResolveError::MultipleAuthMethods);
    }

    if let Some(basic) = &config.basic_auth {
        if basic.username.is_empty() {
            return Err(ResolveError::MissingBasicAuthUsername);
        }
        let credentials = BASE64_STANDARD.encode(format!("{}:{}", basic.username, basic.password));
        return Ok(Some(format!("Basic {credentials}")));
    }

    if let Some(token) = &config.bearer_token {
        return Ok(Some(format!("Bearer {token}")));
    }

    if let Some(path) = &config.bearer_token_file {
        let token = read_credential_file(source, path)?;
        let token = String::from_utf8_lossy(&token).trim().to_owned();
        return Ok(Some(format!("Bearer {token}")));
    }

    Ok(None)
}

fn tls_material(
    tls_config: Option<&TlsConfig>,
    source: &dyn BootstrapSource,
) -> Result<TlsMaterial, ResolveError> {
    let Some(tls_config) = tls_config else {
        return Ok(TlsMaterial::default());
    };

    let ca_pem = tls_config
        .ca_file
        .as_deref()
        .map(|path| read_credential_file(source, path))
        .transpose()?;

    let identity_pem = match (&tls_config.cert_file, &tls_config.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let mut pem = read_credential_file(source, cert_file)?;
            pem.push(b'\n');
            pem.extend_from_slice(&read_credential_file(source, key_file)?);
            Some(pem)
        }
        (None, None) => None,
        _ => return Err(ResolveError::IncompleteClientIdentity),
    };

    Ok(TlsMaterial {
        ca_pem,
        identity_pem,
        accept_invalid_certs: tls_config.insecure_skip_verify,
    })
}

fn read_credential_file(
    source: &dyn BootstrapSource,
    path: &Path,
) -> Result<Vec<u8>, ResolveError> {
    source
        .read_file(path)
        .map_err(|source| ResolveError::ReadFile {
            path: path.to_owned(),
            source,
        })
}

/// Joins a host and port, bracketing bare IPv6 hosts.
pub(crate) fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
