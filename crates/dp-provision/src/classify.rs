//! Classification of provider API failures.
//!
//! Every provider call site consults [`classify`] and branches on the
//! disposition instead of inspecting error shapes. A quota or permission
//! error retried forever is a retry storm; a transient outage treated as
//! fatal strands a half-created cluster. Both sides of that line live
//! here and nowhere else.

use gcloud_api::Error as ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The provider was unavailable or throttling at the transport level;
    /// the same request may succeed later.
    Retryable,
    /// The request itself is bad (4xx); it will never succeed unmodified.
    Fatal,
    /// The addressed resource does not exist. For describe this is an
    /// absence value, for delete it is idempotent success.
    NotFound,
}

/// Decide how a provider failure should be handled. 404 is NotFound,
/// any other 4xx is Fatal, everything else (5xx, transport failures,
/// responses with no status at all) is Retryable.
pub fn classify(err: &ApiError) -> Disposition {
    match err.status() {
        Some(status) if status.as_u16() == 404 => Disposition::NotFound,
        Some(status) if status.is_client_error() => Disposition::Fatal,
        _ => Disposition::Retryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn api_error(status: u16) -> ApiError {
        ApiError::Api {
            endpoint: "test",
            status: StatusCode::from_u16(status).unwrap(),
            body: String::new(),
        }
    }

    #[test]
    fn not_found_is_its_own_disposition() {
        assert_eq!(classify(&api_error(404)), Disposition::NotFound);
    }

    #[test]
    fn client_errors_are_fatal() {
        // includes 429: provider-side quota rejections must not be
        // retried into a storm
        for status in [400, 401, 403, 409, 429] {
            assert_eq!(classify(&api_error(status)), Disposition::Fatal, "status {status}");
        }
    }

    #[test]
    fn server_errors_are_retryable() {
        for status in [500, 502, 503, 504] {
            assert_eq!(classify(&api_error(status)), Disposition::Retryable, "status {status}");
        }
    }

    #[test]
    fn statusless_failures_are_retryable() {
        let err = ApiError::Auth("no status here".to_string());
        assert_eq!(classify(&err), Disposition::Retryable);
    }
}
