//! Pooled HTTP client construction.
//!
//! The client is built once per resolved configuration and shared by every
//! poller holding the context. Construction performs no I/O; connections are
//! established lazily and pooled by the transport.

use std::time::Duration;

use reqwest::{Certificate, Client, Identity};

use crate::resolver::{ResolveError, TlsMaterial};

/// Listings of large clusters can be slow; allow a full minute per request.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Establishing the connection should be quick.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds a pooled client carrying the given TLS material.
///
/// Timeouts are fixed: [`READ_TIMEOUT`] for the whole request and
/// [`CONNECT_TIMEOUT`] for connection establishment. The response body size
/// cap is enforced by the fetch path, not the transport.
pub(crate) fn build_client(tls: &TlsMaterial) -> Result<Client, ResolveError> {
    let mut builder = Client::builder()
        .timeout(READ_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT);

    if let Some(ca_pem) = &tls.ca_pem {
        let certificate = Certificate::from_pem(ca_pem)
            .map_err(|source| ResolveError::InvalidCaCertificate { source })?;
        builder = builder.add_root_certificate(certificate);
    }

    if let Some(identity_pem) = &tls.identity_pem {
        let identity = Identity::from_pem(identity_pem)
            .map_err(|source| ResolveError::InvalidClientIdentity { source })?;
        builder = builder.identity(identity);
    }

    if tls.accept_invalid_certs {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().map_err(ResolveError::BuildClient)
}
