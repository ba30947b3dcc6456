use std::time::Duration;

use serde_json::Value;

use crate::error::{ExecutorError, Result};
use crate::job::{decode_jobs, Job, Report};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one controller.
#[derive(Debug, Clone)]
pub struct ControllerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ControllerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ExecutorError::InvalidUrl(base_url));
        }
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /jobs.json
    pub async fn fetch_jobs(&self) -> Result<Vec<Job>> {
        let response = self
            .http
            .get(format!("{}/jobs.json", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExecutorError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let raw: Vec<Value> = response.json().await?;
        Ok(decode_jobs(raw))
    }

    /// POST /report
    pub async fn report(&self, report: &Report) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/report", self.base_url))
            .json(report)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExecutorError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn rejects_urls_without_scheme() {
        assert!(matches!(
            ControllerClient::new("localhost:8070"),
            Err(ExecutorError::InvalidUrl(_))
        ));
        let client = ControllerClient::new("http://localhost:8070/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8070");
    }

    #[tokio::test]
    async fn fetch_jobs_decodes_list() {
        let mut server = mockito::Server::new_async().await;
        let uuid = Uuid::new_v4();
        let mock = server
            .mock("GET", "/jobs.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([{"uuid": uuid, "type": "shell", "opts": {"cmd": "echo hi", "interval": 5}}])
                    .to_string(),
            )
            .create_async()
            .await;

        let client = ControllerClient::new(&server.url()).unwrap();
        let jobs = client.fetch_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].uuid, uuid);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_jobs_surfaces_http_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/jobs.json")
            .with_status(503)
            .with_body("busy")
            .create_async()
            .await;

        let client = ControllerClient::new(&server.url()).unwrap();
        let err = client.fetch_jobs().await.unwrap_err();
        assert!(matches!(err, ExecutorError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn report_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let uuid = Uuid::new_v4();
        let mock = server
            .mock("POST", "/report")
            .match_body(mockito::Matcher::PartialJson(
                json!({"uuid": uuid, "result": "hi\n"}),
            ))
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;

        let client = ControllerClient::new(&server.url()).unwrap();
        client
            .report(&Report::now(uuid, "hi\n".into()))
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
