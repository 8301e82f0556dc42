use thiserror::Error;

/// Failures reported by one of the upstream AI services.
///
/// Clients return these inside `anyhow::Error` so the retry policy can
/// downcast and look at the HTTP status instead of sniffing message text.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} API error (HTTP {status}): {body}")]
    Http {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an empty response")]
    EmptyResponse { service: &'static str },

    #[error("{service} API key missing; set {env_var} or add it to config.yml")]
    MissingApiKey {
        service: &'static str,
        env_var: &'static str,
    },
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Reads a non-success response into an `UpstreamError::Http`.
pub async fn http_error(service: &'static str, resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status().as_u16();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
    UpstreamError::Http {
        service,
        status,
        body,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_status_and_body() {
        let err = UpstreamError::Http {
            service: "ElevenLabs",
            status: 401,
            body: "invalid api key".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("401"));
        assert!(text.contains("invalid api key"));
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn test_missing_key_names_env_var() {
        let err = UpstreamError::MissingApiKey {
            service: "Anthropic",
            env_var: "ANTHROPIC_API_KEY",
        };
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
        assert_eq!(err.status(), None);
    }
}
