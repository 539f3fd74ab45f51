use thiserror::Error;

/// Failures talking to Civitai. These stop at the fetch boundary; the analysis
/// core never sees them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CivitaiError {
    /// 401/403, usually an expired session token
    #[error("Civitai rejected the session token (HTTP {0}); run `set-token` with a fresh one")]
    Unauthorized(u16),
    #[error("No Civitai session token configured; set CIVITAI_SESSION_COOKIE or run `set-token`")]
    MissingToken,
    #[error("Civitai HTTP error {status}: {body}")]
    Http { status: u16, body: String },
    /// Error envelope returned inside a 200 response
    #[error("Civitai tRPC error: {0}")]
    Trpc(String),
    #[error("Failed to decode {procedure} response: {source}")]
    Decode {
        procedure: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Request to Civitai failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{0} not found")]
    NotFound(String),
}

impl CivitaiError {
    pub fn decode(procedure: &str, source: serde_json::Error) -> Self {
        CivitaiError::Decode {
            procedure: procedure.to_string(),
            source,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, CivitaiError::Unauthorized(_) | CivitaiError::MissingToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = CivitaiError::Http {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Civitai HTTP error 500: boom");
        assert!(CivitaiError::Unauthorized(401).to_string().contains("set-token"));
        assert_eq!(CivitaiError::Trpc("bad input".into()).to_string(), "Civitai tRPC error: bad input");
    }

    #[test]
    fn test_is_auth() {
        assert!(CivitaiError::Unauthorized(403).is_auth());
        assert!(CivitaiError::MissingToken.is_auth());
        assert!(!CivitaiError::NotFound("image 1".into()).is_auth());
    }

    #[test]
    fn test_decode_keeps_source() {
        let source = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = CivitaiError::decode("image.get", source);
        assert!(err.to_string().starts_with("Failed to decode image.get response"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
