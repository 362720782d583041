use reqwest::{Proxy, Response, StatusCode};
use serde::de::DeserializeOwned;

use chat_core::ProxyAuth;

use crate::error::{BackendError, Result};

pub fn apply_proxy_auth(proxy: Proxy, auth: Option<&ProxyAuth>) -> Proxy {
    let Some(auth) = auth else {
        return proxy;
    };
    if auth.username.is_empty() {
        return proxy;
    }
    proxy.basic_auth(&auth.username, &auth.password)
}

/// Map non-2xx statuses onto store errors.
///
/// 404 means the addressed message/branch/version is unknown, 409 means the
/// store refused a mutation against stale state.
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(url = %url, status = %status, body = %body, "Store returned error status");

    match status {
        StatusCode::NOT_FOUND => Err(BackendError::NotFound(if body.is_empty() {
            url.path().to_string()
        } else {
            body
        })),
        StatusCode::CONFLICT => Err(BackendError::Rejected(body)),
        _ => Err(BackendError::Status {
            status: status.as_u16(),
            body,
        }),
    }
}

/// Check the status and decode a JSON body.
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
