// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::Duration;

use anyhow::{Context, Result, bail};
use katalog_app::{
    DatasetKind, LookupKind, Record, RemoteError, WriteFailure, WriteMethod, WriteRequest,
};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use url::Url;

/// Blocking gateway to the catalog REST backend.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            bail!(
                "server.base_url must not be empty -- set it in the config file or KATALOG_BASE_URL"
            );
        }
        let base_url = Url::parse(trimmed)
            .with_context(|| format!("parse server.base_url {trimmed:?}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!(
                "server.base_url must use http or https, got {:?}",
                base_url.scheme()
            );
        }
        if base_url.cannot_be_a_base() {
            bail!("server.base_url {trimmed:?} cannot carry a path -- use http://host:port");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Joins raw segments onto the base URL, percent-encoding each one.
    pub fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment.as_ref());
            }
        }
        url
    }

    pub fn fetch_dataset(&self, kind: DatasetKind) -> Result<Vec<Record>, RemoteError> {
        log::debug!("fetch dataset {}", kind.as_str());
        let records = self.fetch_records(&[kind.as_str()])?;
        log::debug!("dataset {} returned {} rows", kind.as_str(), records.len());
        Ok(records)
    }

    pub fn fetch_lookup(&self, kind: LookupKind) -> Result<Vec<Record>, RemoteError> {
        log::debug!("fetch lookup {}", kind.describe());
        self.fetch_records(kind.path_segments().as_slice())
    }

    fn fetch_records<S: AsRef<str>>(&self, segments: &[S]) -> Result<Vec<Record>, RemoteError> {
        let url = self.endpoint(segments);
        let response = self
            .http
            .get(url.clone())
            .send()
            .map_err(|error| connection_error(self.base_url(), &error))?;

        let status = response.status();
        let body = response.text().map_err(|error| {
            RemoteError::new(Some(status.as_u16()), format!("read response body: {error}"))
        })?;
        if !status.is_success() {
            return Err(clean_error_response(status, &body));
        }
        serde_json::from_str::<Vec<Record>>(&body).map_err(|error| {
            RemoteError::new(
                Some(status.as_u16()),
                format!("decode {}: {error}", url.path()),
            )
        })
    }

    /// Issues one write. The success body is ignored; the caller reloads.
    pub fn send(&self, write: &WriteRequest) -> Result<(), RemoteError> {
        log::info!("{}", write.describe());
        let url = self.endpoint(write.path.as_slice());
        let mut request: RequestBuilder = self.http.request(method(write.method), url);
        if let Some(body) = &write.body {
            request = request.json(body);
        }
        let response = request
            .send()
            .map_err(|error| connection_error(self.base_url(), &error))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        let error = clean_error_response(status, &body);
        log::warn!("{} failed: {error}", write.describe());
        Err(error)
    }

    /// Issues writes in order and stops at the first failure. The failure
    /// carries how many writes the server already accepted.
    pub fn send_all(&self, writes: &[WriteRequest]) -> Result<usize, WriteFailure> {
        for (sent, write) in writes.iter().enumerate() {
            if let Err(error) = self.send(write) {
                if sent > 0 {
                    log::warn!("{sent} of {} writes applied before failure", writes.len());
                }
                return Err(WriteFailure::new(sent, error));
            }
        }
        Ok(writes.len())
    }

    /// Confirms the backend answers a cheap catalog read.
    pub fn ping(&self) -> Result<()> {
        self.fetch_lookup(LookupKind::Genres)
            .map(|_| ())
            .with_context(|| format!("check catalog server at {}", self.base_url()))
    }
}

fn method(method: WriteMethod) -> Method {
    match method {
        WriteMethod::Post => Method::POST,
        WriteMethod::Put => Method::PUT,
        WriteMethod::Delete => Method::DELETE,
    }
}

fn connection_error(base_url: &str, error: &reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        return RemoteError::transport(format!(
            "{base_url} timed out -- raise server.timeout or check the server load"
        ));
    }
    RemoteError::transport(format!(
        "cannot reach {base_url} -- start the catalog server or fix server.base_url ({error})"
    ))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<String>,
}

/// Server message verbatim when the body carries `{error}`, else a short
/// plain body, else a generic line.
fn clean_error_response(status: StatusCode, body: &str) -> RemoteError {
    let code = Some(status.as_u16());
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(message) = parsed.error
        && !message.trim().is_empty()
    {
        return RemoteError::new(code, message);
    }

    let trimmed = body.trim();
    let plain = !trimmed.contains('<') && !trimmed.contains('{');
    if !trimmed.is_empty() && trimmed.len() < 100 && plain {
        return RemoteError::new(
            code,
            format!("server error ({}): {trimmed}", status.as_u16()),
        );
    }

    RemoteError::new(code, format!("server returned {}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;

    use super::{Client, clean_error_response};

    #[test]
    fn error_envelope_message_is_verbatim() {
        let error = clean_error_response(
            StatusCode::NOT_FOUND,
            r#"{"error": "Книга не найдена"}"#,
        );
        assert_eq!(error.status, Some(404));
        assert_eq!(error.to_string(), "Книга не найдена");
    }

    #[test]
    fn html_bodies_fall_back_to_status() {
        let error = clean_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "<html><body>Internal Server Error</body></html>",
        );
        assert_eq!(error.to_string(), "server returned 500");
    }

    #[test]
    fn short_plain_bodies_are_kept() {
        let error = clean_error_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(error.to_string(), "server error (502): upstream down");
    }

    #[test]
    fn endpoint_encodes_each_segment() {
        let client = Client::new("http://127.0.0.1:5000/api/", Duration::from_secs(1))
            .expect("client should initialize");
        let url = client.endpoint(&["delete", "reader", "by-name", "Иванов И.И./x"]);
        assert_eq!(
            url.path(),
            "/api/delete/reader/by-name/%D0%98%D0%B2%D0%B0%D0%BD%D0%BE%D0%B2%20%D0%98.%D0%98.%2Fx"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(Client::new("", Duration::from_secs(1)).is_err());
        assert!(Client::new("ftp://example.com", Duration::from_secs(1)).is_err());
        assert!(Client::new("mailto:someone@example.com", Duration::from_secs(1)).is_err());
    }
}
