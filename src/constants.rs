//! Well-known names used for in-cluster bootstrap.
//!
//! These follow the conventions documented for the Kubernetes service account
//! admission controller; see
//! <https://kubernetes.io/docs/reference/access-authn-authz/service-accounts-admin/>.

/// Env var holding the API server host when running inside a cluster.
pub const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";

/// Env var holding the API server port when running inside a cluster.
pub const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

/// Mounted CA certificate trusted for the in-cluster API server.
pub const SERVICE_ACCOUNT_CA_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Mounted bearer token identifying the pod's service account.
pub const SERVICE_ACCOUNT_TOKEN_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";
