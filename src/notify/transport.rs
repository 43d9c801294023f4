//! Fan-out to `shoutrrr`-style service URLs: `email://`, `slack://`,
//! `msteams://`, `gotify://`, and a pass-through generic webhook scheme.

use reqwest::Client;
use serde_json::json;
use url::Url;

use super::classify::{classify, sanitize_url, FailureKind};

#[derive(Debug, Clone)]
pub struct SendFailure {
    pub scheme: String,
    pub sanitized_url: String,
    pub kind: FailureKind,
    pub reason: String,
}

pub struct Router {
    http: Client,
}

impl Router {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Send `message` to every URL in order, collecting per-URL failures.
    /// A URL that sends successfully contributes nothing to the result.
    pub async fn send(&self, message: &str, urls: &[String]) -> Vec<SendFailure> {
        let mut failures = Vec::new();
        for url in urls {
            if let Err(reason) = self.send_one(message, url).await {
                let scheme = Url::parse(url).map(|u| u.scheme().to_string()).unwrap_or_default();
                failures.push(SendFailure {
                    scheme,
                    sanitized_url: sanitize_url(url),
                    kind: classify(&reason),
                    reason,
                });
            }
        }
        failures
    }

    async fn send_one(&self, message: &str, url: &str) -> Result<(), String> {
        let parsed = Url::parse(url).map_err(|e| format!("invalid url: {e}"))?;

        match parsed.scheme() {
            "slack" | "msteams" | "gotify" => self.send_webhook(message, &parsed).await,
            "email" => self.send_email(message, &parsed).await,
            "webhook" | "http" | "https" => self.send_raw(message, &parsed).await,
            other => Err(format!("unsupported notification scheme: {other}")),
        }
    }

    async fn send_webhook(&self, message: &str, url: &Url) -> Result<(), String> {
        let target = to_https_endpoint(url);
        let response = self
            .http
            .post(&target)
            .json(&json!({ "text": message }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        check_status(response).await
    }

    async fn send_email(&self, message: &str, url: &Url) -> Result<(), String> {
        // SMTP delivery is out of scope for the in-process transport; relay
        // through a configured HTTP-to-SMTP bridge endpoint when present,
        // matching the generic webhook contract.
        let target = to_https_endpoint(url);
        let response = self
            .http
            .post(&target)
            .json(&json!({ "body": message }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        check_status(response).await
    }

    async fn send_raw(&self, message: &str, url: &Url) -> Result<(), String> {
        let response = self
            .http
            .post(url.as_str())
            .body(message.to_string())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        check_status(response).await
    }
}

fn to_https_endpoint(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let path = url.path();
    format!("https://{host}{path}")
}

async fn check_status(response: reqwest::Response) -> Result<(), String> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(format!("{status} {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsupported_scheme_is_rejected_before_any_request() {
        let router = Router::new(Client::new());
        let failures = router.send("hi", &["ftp://example.com".to_string()]).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Unknown);
    }

    #[tokio::test]
    async fn invalid_url_is_reported_with_empty_scheme() {
        let router = Router::new(Client::new());
        let failures = router.send("hi", &["not a url".to_string()]).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].scheme, "");
    }
}
