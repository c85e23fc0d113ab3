//! HTTP client for the college ERP API.

use std::time::Duration;

use actix_web::web::Bytes;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;
use crate::error::AppError;
use crate::model::attendance::AttendanceRecord;
use crate::model::upstream::{Envelope, SubjectRecord};

/// Ordering for the cards endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardOrder {
    OldestFirst,
    NewestFirst,
}

impl CardOrder {
    fn as_param(self) -> &'static str {
        match self {
            CardOrder::OldestFirst => "datetime1",
            CardOrder::NewestFirst => "-datetime1",
        }
    }
}

/// Parameters identifying one subject's attendance cards.
#[derive(Debug, Clone)]
pub struct CardsQuery<'a> {
    pub subject: &'a str,
    pub student_id: &'a str,
    pub cf_id: &'a str,
    pub order: CardOrder,
}

#[derive(Debug, Clone)]
pub struct ErpClient {
    http: Client,
    base_url: String,
    web_origin: String,
    request_timeout: Duration,
    subject_timeout: Duration,
    quiz_timeout: Duration,
}

impl ErpClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = Client::builder()
            .build()
            .map_err(|e| AppError::internal_with("Failed to build HTTP client", e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
            web_origin: config.upstream_web_origin.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
            subject_timeout: config.subject_fetch_timeout,
            quiz_timeout: config.quiz_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Maps a non-success status into [`AppError::Upstream`], logging the body.
    async fn ensure_success(response: Response, what: &str) -> Result<Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), body = %body, "{} failed", what);
        Err(AppError::Upstream {
            status: status.as_u16(),
            message: format!("External API error {}", status.as_u16()),
        })
    }

    async fn envelope<T: DeserializeOwned>(response: Response) -> Result<Option<T>, AppError> {
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.into_data())
    }

    /// Exchanges credentials upstream. Status and body are returned untouched.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<(u16, Bytes), AppError> {
        let response = self
            .http
            .post(self.url("/admin/authenticate"))
            .header("Origin", &self.web_origin)
            .header("Referer", format!("{}/", self.web_origin))
            .form(&[("username", username), ("password", password)])
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        debug!(status, bytes = body.len(), "Upstream authenticate answered");
        Ok((status, body))
    }

    /// Subject mappings with their embedded attendance tallies. The last row
    /// is the overall total.
    pub async fn attendance_summary(&self, token: &str) -> Result<Vec<SubjectRecord>, AppError> {
        let response = self
            .http
            .get(self.url("/custom/getCFMappedWithStudentID?embed_attendance_summary=1"))
            .bearer_auth(token)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = Self::ensure_success(response, "Attendance summary fetch").await?;

        match Self::envelope::<Vec<SubjectRecord>>(response).await? {
            Some(records) if !records.is_empty() => Ok(records),
            _ => Err(AppError::BadGateway("No attendance records returned".to_string())),
        }
    }

    pub async fn subjects(&self, token: &str) -> Result<Vec<SubjectRecord>, AppError> {
        let response = self
            .http
            .get(self.url("/custom/getCFMappedWithStudentID"))
            .bearer_auth(token)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = Self::ensure_success(response, "Subjects fetch").await?;

        Ok(Self::envelope::<Vec<SubjectRecord>>(response)
            .await?
            .unwrap_or_default())
    }

    /// Raw attendance cards for one subject.
    pub async fn subject_cards(
        &self,
        token: &str,
        query: &CardsQuery<'_>,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        let mut url = Url::parse(&self.url("/cards"))?;
        url.query_pairs_mut()
            .append_pair("type", "Attendance")
            .append_pair("sort_by", query.order.as_param())
            .append_pair("report_title", query.subject)
            .append_pair("equalto___fk_student", query.student_id)
            .append_pair("equalto___cf_id", query.cf_id)
            .append_pair("token", token);

        let response = self
            .http
            .get(url)
            .timeout(self.subject_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            warn!(subject = query.subject, status, "Fetch cards failed");
            return Err(AppError::Upstream {
                status,
                message: format!("HTTP {status}"),
            });
        }

        let records = Self::envelope::<Vec<AttendanceRecord>>(response)
            .await?
            .unwrap_or_default();
        debug!(subject = query.subject, records = records.len(), "Fetched attendance cards");
        Ok(records)
    }

    pub async fn quizzes(&self, token: &str) -> Result<Value, AppError> {
        let response = self
            .http
            .get(self.url("/custom/myEvaluatedQuizzes"))
            .bearer_auth(token)
            .timeout(self.quiz_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or_default();
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message: format!(
                    "API request failed with status {}: {}",
                    status.as_u16(),
                    message
                ),
            });
        }

        Ok(response.json().await?)
    }
}
