// Failure taxonomy for the mutation pipeline.
//
// Transport and HTTP plumbing elsewhere uses anyhow, but the resolver has
// to tell a rejected request from an unreachable server, so API calls
// return a typed error instead.

use thiserror::Error;

/// Why a call to the Pulse API did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The server answered with an error status (already liked, not found,
    /// blocked content, unreadable body).
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The request never got an answer: timeout, DNS, refused connection.
    #[error("service unreachable: {0}")]
    Unreachable(String),

    /// A 401-class response. The session is surfaced upward; the engine
    /// itself never logs out.
    #[error("session expired")]
    SessionExpired,
}

impl ApiError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }

    /// Map a non-success HTTP status and its body to an error.
    ///
    /// The server reports failures as `{"detail": "..."}`; anything else is
    /// passed through as raw text.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 401 {
            return ApiError::SessionExpired;
        }

        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("Request failed ({status})")
                } else {
                    trimmed.to_string()
                }
            });

        ApiError::Rejected { status, detail }
    }
}

/// A gesture the dispatcher refused before touching the cache or network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The target is not in the entity cache (deleted elsewhere, never loaded).
    #[error("{0} is not loaded in this session")]
    UnknownTarget(String),

    #[error("comment text cannot be empty")]
    EmptyComment,

    #[error("you cannot follow yourself")]
    SelfFollow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_session_expired() {
        let err = ApiError::from_status(401, r#"{"detail":"Invalid token"}"#);
        assert!(err.is_session_expired());
    }

    #[test]
    fn detail_field_is_extracted() {
        let err = ApiError::from_status(400, r#"{"detail":"Already liked"}"#);
        assert_eq!(
            err,
            ApiError::Rejected {
                status: 400,
                detail: "Already liked".to_string()
            }
        );
    }

    #[test]
    fn plain_text_body_is_kept() {
        let err = ApiError::from_status(502, "Bad Gateway\n");
        assert_eq!(
            err,
            ApiError::Rejected {
                status: 502,
                detail: "Bad Gateway".to_string()
            }
        );
    }

    #[test]
    fn empty_body_gets_generic_detail() {
        let err = ApiError::from_status(404, "");
        assert_eq!(err.to_string(), "request rejected (404): Request failed (404)");
    }
}
