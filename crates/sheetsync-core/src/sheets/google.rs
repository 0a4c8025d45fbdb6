//! Google Sheets v4 `values` API client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use urlencoding::encode;

use super::{CellRows, Credentials, SheetsError, SpreadsheetClient};
use crate::util::{compact_text, is_http_url, normalize_text_option};

pub const DEFAULT_SHEETS_API_URL: &str = "https://sheets.googleapis.com";
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    api_base: String,
    credentials: Arc<Credentials>,
}

impl std::fmt::Debug for GoogleSheetsClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("GoogleSheetsClient")
            .field("api_base", &self.api_base)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: CellRows,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: CellRows,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: Option<GoogleErrorDetail>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    message: Option<String>,
    status: Option<String>,
}

impl GoogleSheetsClient {
    pub fn new(api_base: impl Into<String>, credentials: Credentials) -> Result<Self, SheetsError> {
        let api_base = normalize_api_base(api_base.into())?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            api_base,
            credentials: Arc::new(credentials),
        })
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.api_base,
            encode(spreadsheet_id),
            encode(range)
        )
    }
}

impl SpreadsheetClient for GoogleSheetsClient {
    async fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<CellRows, SheetsError> {
        let token = self.credentials.access_token(&self.http).await?;
        let response = self
            .http
            .get(self.values_url(spreadsheet_id, range))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body, "values.get"));
        }

        let payload = response
            .json::<ValueRange>()
            .await
            .map_err(|error| SheetsError::InvalidResponse(format!("values.get: {error}")))?;
        Ok(payload.values)
    }

    async fn write_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: CellRows,
    ) -> Result<(), SheetsError> {
        let token = self.credentials.access_token(&self.http).await?;
        let body = ValueRangeBody {
            range,
            major_dimension: "ROWS",
            values,
        };
        let response = self
            .http
            .put(self.values_url(spreadsheet_id, range))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body, "values.update"));
        }

        Ok(())
    }
}

/// Turn a non-success response into `SheetsError::Api`, keeping the status
/// for retry classification.
pub(super) fn api_error(status: StatusCode, body: &str, context: &str) -> SheetsError {
    SheetsError::api(status.as_u16(), format!("{context}: {}", error_message(body)))
}

fn error_message(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<GoogleErrorBody>(body) {
        if let Some(detail) = payload.error {
            let message = detail.message.unwrap_or_default();
            return match detail.status {
                Some(status) => format!("{} [{status}]", message.trim()),
                None => message.trim().to_string(),
            };
        }
        if let Some(description) = payload.error_description {
            return description.trim().to_string();
        }
    }

    let compacted = compact_text(body);
    if compacted.is_empty() {
        "empty response body".to_string()
    } else {
        compacted
    }
}

fn normalize_api_base(raw: String) -> Result<String, SheetsError> {
    let api_base = normalize_text_option(Some(raw)).ok_or_else(|| {
        SheetsError::InvalidConfiguration("Sheets API URL must not be empty".to_string())
    })?;
    if is_http_url(&api_base) {
        Ok(api_base.trim_end_matches('/').to_string())
    } else {
        Err(SheetsError::InvalidConfiguration(
            "Sheets API URL must include http:// or https://".to_string(),
        ))
    }
}
