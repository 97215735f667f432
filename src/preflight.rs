//! Preflight (C12): cheap reachability check before handing a receiver URL
//! to the build pipeline. HEAD first, GET-with-range fallback on 405,
//! 5 second timeout either way.

use reqwest::{Client, StatusCode};
use url::Url;

use crate::error::AppError;

/// Checks that `url` (`http[s]://` only) is reachable, mapping the response
/// to the §7 error kinds. Anything else (2xx/3xx) is treated as reachable.
pub async fn check(client: &Client, url: &Url) -> Result<(), AppError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Ok(());
    }

    let head_response = client
        .head(url.clone())
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await;

    let status = match head_response {
        Ok(resp) if resp.status() == StatusCode::METHOD_NOT_ALLOWED => {
            let get_response = client
                .get(url.clone())
                .header("Range", "bytes=0-4095")
                .timeout(std::time::Duration::from_secs(5))
                .send()
                .await
                .map_err(|e| AppError::ReceiverUnreachable(e.to_string()))?;
            get_response.status()
        }
        Ok(resp) => resp.status(),
        Err(e) => return Err(AppError::ReceiverUnreachable(e.to_string())),
    };

    classify_status(status)
}

fn classify_status(status: StatusCode) -> Result<(), AppError> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            Err(AppError::ReceiverUnreachable(format!(
                "source unavailable: HTTP {status}"
            )))
        }
        s if s.is_server_error() => Err(AppError::ReceiverUnreachable(format!(
            "receiver server error: HTTP {status}"
        ))),
        _ => Ok(()),
    }
}
