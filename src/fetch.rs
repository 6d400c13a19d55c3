//! Authenticated API fetches.
//!
//! One call = one `GET` against the resolved context: the namespace and
//! selector restrictions become `labelSelector`/`fieldSelector` query
//! parameters, the authorization header is attached, gzip is negotiated and
//! transparently decoded, and anything other than `200 OK` is rejected with
//! the status and a bounded body preview.
//!
//! Fetches may block on network I/O for up to the configured read timeout;
//! keep them off latency-sensitive paths. Dropping the returned future aborts
//! the in-flight request without affecting other fetches sharing the pooled
//! client.

use std::io::Read as _;

use flate2::read::GzDecoder;
use futures::StreamExt as _;
use reqwest::header::{ACCEPT_ENCODING, AUTHORIZATION, CONTENT_ENCODING};
use reqwest::StatusCode;
use thiserror::Error;
use url::{form_urlencoded, Url};

use crate::config::Selector;
use crate::context::ResolvedContext;
use crate::prelude::warn;

/// Hard cap on (decoded) response body size. Bounds memory under pathological
/// responses; large-cluster listings stay well below this.
pub const MAX_RESPONSE_BODY_SIZE: usize = 300 * 1024 * 1024;

/// How much of an error response body to keep for diagnostics.
const BODY_PREVIEW_LIMIT: usize = 1024;

/// Errors produced by [`ResolvedContext::fetch_api_response`].
///
/// All variants carry the request URL; the polling caller decides whether and
/// when to retry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The resource path could not be appended to the server URL.
    #[error("cannot build request URL for path {path:?}: {source}")]
    InvalidRequestUrl {
        /// The offending resource path.
        path: String,
        /// Underlying parse error.
        source: url::ParseError,
    },

    /// Connect, timeout or transport failure.
    #[error("cannot fetch {url}: {source}")]
    Transport {
        /// The request URL.
        url: String,
        /// Underlying transport error.
        source: reqwest::Error,
    },

    /// The response body exceeded [`MAX_RESPONSE_BODY_SIZE`].
    #[error("response from {url} exceeds the maximum body size of {limit} bytes")]
    BodyTooLarge {
        /// The request URL.
        url: String,
        /// The enforced limit, in bytes.
        limit: usize,
    },

    /// The response declared gzip encoding but could not be decompressed.
    #[error("cannot ungzip response from {url}: {source}")]
    Gunzip {
        /// The request URL.
        url: String,
        /// Underlying decode error.
        source: std::io::Error,
    },

    /// The API server returned something other than `200 OK`.
    #[error("unexpected status code returned from {url}: {status}; expecting 200; response body: {body:?}")]
    UnexpectedStatus {
        /// The request URL.
        url: String,
        /// The returned status code.
        status: StatusCode,
        /// Decoded body, truncated for diagnostics.
        body: String,
    },
}

impl ResolvedContext {
    /// Fetches `path` for the given resource `role` and returns the decoded
    /// body bytes.
    ///
    /// The query string is composed from the context's namespace restrictions
    /// and the selectors configured for `role`; it is appended only when
    /// non-empty. The shared context is not mutated.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on transport failure, oversized or
    /// undecodable bodies, or a non-`200` status.
    pub async fn fetch_api_response(&self, role: &str, path: &str) -> Result<Vec<u8>, FetchError> {
        // Append to the server's existing path: a configured path prefix
        // (e.g. an apiserver proxy) must survive, so no URL-style join.
        let base = self.api_server.as_str().trim_end_matches('/');
        let mut request_url = Url::parse(&format!("{base}{path}")).map_err(|source| {
            FetchError::InvalidRequestUrl {
                path: path.to_owned(),
                source,
            }
        })?;

        let query = join_selectors(role, &self.namespaces, &self.selectors);
        if !query.is_empty() {
            request_url.set_query(Some(&query));
        }
        let url = request_url.to_string();

        let mut request = self
            .client
            .get(request_url)
            .header(ACCEPT_ENCODING, "gzip");
        if let Some(authorization) = &self.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = request.send().await.map_err(|source| FetchError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        let gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"gzip"));

        // Stream the body so oversized responses are rejected before full
        // buffering.
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;
            if body.len() + chunk.len() > MAX_RESPONSE_BODY_SIZE {
                return Err(FetchError::BodyTooLarge {
                    url,
                    limit: MAX_RESPONSE_BODY_SIZE,
                });
            }
            body.extend_from_slice(&chunk);
        }

        let data = if gzipped {
            let decoded = gunzip(&body).map_err(|source| FetchError::Gunzip {
                url: url.clone(),
                source,
            })?;
            if decoded.len() > MAX_RESPONSE_BODY_SIZE {
                return Err(FetchError::BodyTooLarge {
                    url,
                    limit: MAX_RESPONSE_BODY_SIZE,
                });
            }
            decoded
        } else {
            body
        };

        if status != StatusCode::OK {
            warn!("discovery fetch of {url} returned status {status}");
            return Err(FetchError::UnexpectedStatus {
                url,
                status,
                body: body_preview(&data),
            });
        }

        Ok(data)
    }
}

/// Composes the query string for one fetch.
///
/// Namespace restrictions become `metadata.namespace=<ns>` field-selector
/// terms; selectors whose role matches contribute their label and field
/// expressions. Terms are comma-joined and url-encoded. Returns the empty
/// string when nothing applies.
fn join_selectors(role: &str, namespaces: &[String], selectors: &[Selector]) -> String {
    let mut label_terms: Vec<&str> = Vec::new();
    let mut field_terms: Vec<String> = namespaces
        .iter()
        .map(|ns| format!("metadata.namespace={ns}"))
        .collect();

    for selector in selectors {
        if selector.role != role {
            continue;
        }
        if !selector.label.is_empty() {
            label_terms.push(&selector.label);
        }
        if !selector.field.is_empty() {
            field_terms.push(selector.field.clone());
        }
    }

    let mut query = form_urlencoded::Serializer::new(String::new());
    if !label_terms.is_empty() {
        query.append_pair("labelSelector", &label_terms.join(","));
    }
    if !field_terms.is_empty() {
        query.append_pair("fieldSelector", &field_terms.join(","));
    }
    query.finish()
}

fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    // Read one byte past the cap so the caller can detect overflow.
    GzDecoder::new(data)
        .take(MAX_RESPONSE_BODY_SIZE as u64 + 1)
        .read_to_end(&mut decoded)?;
    Ok(decoded)
}

fn body_preview(data: &[u8]) -> String {
    let end = data.len().min(BODY_PREVIEW_LIMIT);
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn selector(role: &str, label: &str, field: &str) -> Selector {
        Selector {
            role: role.into(),
            label: label.into(),
            field: field.into(),
        }
    }

    macro_rules! join_selectors_tests {
        ($($name:ident: $value:expr,)*) => {
            $(
                #[test]
                fn $name() {
                    let (role, namespaces, selectors, expected) = $value;
                    let namespaces: Vec<String> =
                        namespaces.iter().map(|ns: &&str| (*ns).to_owned()).collect();
                    assert_eq!(join_selectors(role, &namespaces, &selectors), expected);
                }
            )*
        }
    }

    join_selectors_tests! {
        empty_inputs_produce_no_query: ("pod", [] as [&str; 0], vec![], ""),

        namespaces_become_field_selectors: (
            "pod",
            ["monitoring", "default"],
            vec![],
            "fieldSelector=metadata.namespace%3Dmonitoring%2Cmetadata.namespace%3Ddefault",
        ),

        matching_role_contributes_label_and_field: (
            "pod",
            [] as [&str; 0],
            vec![selector("pod", "app=web", "spec.nodeName=node-1")],
            "labelSelector=app%3Dweb&fieldSelector=spec.nodeName%3Dnode-1",
        ),

        other_roles_are_skipped: (
            "pod",
            [] as [&str; 0],
            vec![selector("node", "zone=us-east", "")],
            "",
        ),

        namespaces_and_selector_fields_are_joined: (
            "endpoints",
            ["monitoring"],
            vec![
                selector("endpoints", "app=web", "metadata.name=web-svc"),
                selector("pod", "ignored=yes", ""),
            ],
            "labelSelector=app%3Dweb&fieldSelector=metadata.namespace%3Dmonitoring%2Cmetadata.name%3Dweb-svc",
        ),
    }

    #[test]
    fn gunzip_round_trips() {
        let original = b"{\"items\": []}".repeat(50);
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&original).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(gunzip(&compressed).unwrap(), original);
    }

    #[test]
    fn gunzip_rejects_garbage() {
        assert!(gunzip(b"definitely not gzip").is_err());
    }

    #[test]
    fn body_preview_is_bounded() {
        let body = vec![b'x'; BODY_PREVIEW_LIMIT * 4];
        let preview = body_preview(&body);
        assert_eq!(preview.len(), BODY_PREVIEW_LIMIT);
    }

    #[test]
    fn body_preview_tolerates_invalid_utf8() {
        let preview = body_preview(&[0xff, 0xfe, b'o', b'k']);
        assert!(preview.ends_with("ok"));
    }
}
