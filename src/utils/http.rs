use reqwest::StatusCode;

use crate::TranscriptorError;

/// Map a non-success HTTP status to the failure taxonomy
pub fn classify_status(service: &str, status: StatusCode, body: &str) -> TranscriptorError {
    let detail = body.trim();
    let detail = if detail.len() > 200 {
        // keep messages short; stay on a char boundary
        let cut = (0..=200).rev().find(|i| detail.is_char_boundary(*i)).unwrap_or(0);
        &detail[..cut]
    } else {
        detail
    };
    let message = format!("{} returned HTTP {}: {}", service, status.as_u16(), detail);

    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        TranscriptorError::Transient(message)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        TranscriptorError::NotConfigured(message)
    } else {
        TranscriptorError::TranscriptionFailed(message)
    }
}

/// Map a transport-level reqwest error to the failure taxonomy
pub fn classify_request_error(service: &str, err: &reqwest::Error) -> TranscriptorError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        TranscriptorError::Transient(format!("{} request failed: {}", service, err))
    } else if let Some(status) = err.status() {
        classify_status(service, status, "")
    } else {
        TranscriptorError::TranscriptionFailed(format!("{} request failed: {}", service, err))
    }
}
