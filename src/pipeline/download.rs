//! Bounded attachment download.
//!
//! The size cap is enforced incrementally as bytes arrive, so an oversized or
//! never-ending transfer is cut off mid-stream instead of after the fact.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use crate::config::Limits;
use crate::errors::AppError;

pub async fn fetch(
    http: &reqwest::Client,
    url: &str,
    limits: &Limits,
) -> Result<Bytes, AppError> {
    let parsed = url::Url::parse(url)
        .map_err(|_| AppError::Validation("attachment URL is not valid".into()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::Validation(
            "attachment URL must use http or https".into(),
        ));
    }

    match tokio::time::timeout(limits.download_timeout, fetch_inner(http, parsed, limits)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::DownloadTimeout),
    }
}

async fn fetch_inner(
    http: &reqwest::Client,
    url: url::Url,
    limits: &Limits,
) -> Result<Bytes, AppError> {
    let resp = http.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(AppError::Hosting(format!(
            "attachment fetch failed ({})",
            resp.status().as_u16()
        )));
    }

    // Fail fast on an honest Content-Length; the streaming check below
    // remains authoritative for dishonest ones.
    if let Some(len) = resp.content_length() {
        if len > limits.max_download_bytes {
            return Err(AppError::DownloadTooLarge {
                limit: limits.max_download_bytes,
            });
        }
    }

    let mut buf = BytesMut::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if buf.len() as u64 + chunk.len() as u64 > limits.max_download_bytes {
            return Err(AppError::DownloadTooLarge {
                limit: limits.max_download_bytes,
            });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_small_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zipbytes".to_vec()))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let bytes = fetch(
            &http,
            &format!("{}/file.zip", server.uri()),
            &Limits::default(),
        )
        .await
        .unwrap();
        assert_eq!(bytes.as_ref(), b"zipbytes");
    }

    #[tokio::test]
    async fn oversized_body_is_cut_off() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let limits = Limits {
            max_download_bytes: 1024,
            ..Limits::default()
        };
        let http = reqwest::Client::new();
        let err = fetch(&http, &format!("{}/big.zip", server.uri()), &limits)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DownloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn slow_transfer_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.zip"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(std::time::Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let limits = Limits {
            download_timeout: std::time::Duration::from_millis(100),
            ..Limits::default()
        };
        let http = reqwest::Client::new();
        let err = fetch(&http, &format!("{}/slow.zip", server.uri()), &limits)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DownloadTimeout));
    }

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let http = reqwest::Client::new();
        assert!(matches!(
            fetch(&http, "ftp://host/file.zip", &Limits::default()).await,
            Err(AppError::Validation(_))
        ));
    }
}
