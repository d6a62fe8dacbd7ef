//! Shared reqwest helpers for the plain HTTP capability services.

use pickabook_core::capabilities::ProviderError;

/// Map a transport failure onto the capability error taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_decode() {
        ProviderError::Decode(err.to_string())
    } else {
        ProviderError::Request(err.to_string())
    }
}

/// Return the response unchanged on 2xx, otherwise the status and body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited(body));
        }
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
