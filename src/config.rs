//! Declarative discovery configuration.
//!
//! A [`DiscoveryConfig`] is supplied by the operator per discovery source and
//! compares by value: two independently constructed configs with equal fields
//! are the *same identity* and share one resolved context (see
//! [`crate::ContextCache`]). Every field is therefore a plain value — no
//! handles, no interior mutability.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for one Kubernetes discovery source.
///
/// An empty `api_server` selects in-cluster bootstrap: the API server address
/// and credentials are discovered from the pod environment instead of this
/// config (see [`crate::bootstrap`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Explicit API server URL, e.g. `https://10.0.0.1:6443`.
    pub api_server: Option<String>,

    /// HTTP basic auth credentials.
    pub basic_auth: Option<BasicAuthConfig>,

    /// Inline bearer token. Mutually exclusive with `bearer_token_file`.
    pub bearer_token: Option<String>,

    /// Path to a file containing the bearer token.
    pub bearer_token_file: Option<PathBuf>,

    /// TLS settings for `https` API servers.
    pub tls_config: Option<TlsConfig>,

    /// Restrict discovery to these namespaces. Empty means all namespaces.
    pub namespaces: Vec<String>,

    /// Per-role label/field selectors passed through to the API server.
    pub selectors: Vec<Selector>,
}

/// HTTP basic auth credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicAuthConfig {
    /// Username. Must be non-empty when basic auth is configured.
    pub username: String,

    /// Password. May be empty.
    pub password: String,
}

/// TLS settings for connecting to an `https` API server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// CA certificate (PEM) used to verify the API server.
    pub ca_file: Option<PathBuf>,

    /// Client certificate (PEM). Requires `key_file`.
    pub cert_file: Option<PathBuf>,

    /// Client private key (PEM). Requires `cert_file`.
    pub key_file: Option<PathBuf>,

    /// Disable server certificate verification.
    pub insecure_skip_verify: bool,
}

/// A label/field selector restricted to one resource role.
///
/// Selector expressions are opaque to this crate; they are forwarded to the
/// API server as `labelSelector`/`fieldSelector` query parameters when the
/// fetched role matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Selector {
    /// Resource role this selector applies to, e.g. `pod` or `endpoints`.
    pub role: String,

    /// Label selector expression, e.g. `app=frontend`.
    pub label: String,

    /// Field selector expression, e.g. `spec.nodeName=node-1`.
    pub field: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn sample_config() -> DiscoveryConfig {
        DiscoveryConfig {
            api_server: Some("https://10.0.0.1:6443".into()),
            bearer_token: Some("secret".into()),
            namespaces: vec!["monitoring".into()],
            selectors: vec![Selector {
                role: "pod".into(),
                label: "app=web".into(),
                field: String::new(),
            }],
            ..DiscoveryConfig::default()
        }
    }

    fn hash_of(config: &DiscoveryConfig) -> u64 {
        let mut hasher = DefaultHasher::new();
        config.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn independently_built_configs_share_identity() {
        let a = sample_config();
        let b = sample_config();

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn any_field_change_yields_a_new_identity() {
        let base = sample_config();

        let mut other = sample_config();
        other.namespaces.push("default".into());
        assert_ne!(base, other);

        let mut other = sample_config();
        other.selectors[0].label = "app=api".into();
        assert_ne!(base, other);

        let mut other = sample_config();
        other.bearer_token = None;
        assert_ne!(base, other);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: DiscoveryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DiscoveryConfig::default());
    }
}
