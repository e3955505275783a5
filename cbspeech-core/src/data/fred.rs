//! FRED (Federal Reserve Economic Data) provider.
//!
//! Fetches observations from the `series/observations` JSON endpoint with a
//! blocking client. There is no retry loop: a failed fetch surfaces to the
//! loader, which applies the cache/CSV fallback.

use super::provider::{DataError, DataSource, FetchResult, MacroProvider, Observation};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

pub const FRED_BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
pub const FRED_API_KEY_ENV: &str = "FRED_API_KEY";

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Option<Vec<RawObservation>>,
    error_code: Option<u16>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    date: String,
    value: String,
}

/// FRED data provider.
pub struct FredProvider {
    client: reqwest::blocking::Client,
    api_key: Option<String>,
    base_url: String,
}

impl FredProvider {
    pub fn new(api_key: Option<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("cbspeech/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: FRED_BASE_URL.to_string(),
        })
    }

    /// Use the explicit key if given, else `FRED_API_KEY`.
    pub fn from_env_or(api_key: Option<String>) -> Result<Self, DataError> {
        Self::new(api_key.or_else(|| std::env::var(FRED_API_KEY_ENV).ok()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Parse an observations response body.
    fn parse_response(series_id: &str, body: &str) -> Result<Vec<Observation>, DataError> {
        let resp: ObservationsResponse = serde_json::from_str(body)
            .map_err(|e| DataError::ResponseFormatChanged(format!("{series_id}: {e}")))?;

        if let Some(code) = resp.error_code {
            let message = resp.error_message.unwrap_or_default();
            if message.contains("does not exist") {
                return Err(DataError::SeriesNotFound {
                    series: series_id.to_string(),
                });
            }
            return Err(DataError::HttpStatus {
                series: series_id.to_string(),
                status: code,
                message,
            });
        }

        let raw = resp.observations.ok_or_else(|| {
            DataError::ResponseFormatChanged(format!("{series_id}: no observations field"))
        })?;

        let mut observations = Vec::with_capacity(raw.len());
        for obs in raw {
            let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d").map_err(|e| {
                DataError::ResponseFormatChanged(format!(
                    "{series_id}: invalid date '{}': {e}",
                    obs.date
                ))
            })?;
            // FRED marks missing observations with "."
            let value = obs.value.trim().parse::<f64>().unwrap_or(f64::NAN);
            observations.push(Observation::new(date, value));
        }

        if observations.is_empty() {
            return Err(DataError::SeriesNotFound {
                series: series_id.to_string(),
            });
        }
        observations.sort_by_key(|o| o.date);
        Ok(observations)
    }
}

impl MacroProvider for FredProvider {
    fn name(&self) -> &str {
        "fred"
    }

    fn fetch(
        &self,
        series_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            DataError::AuthenticationRequired(format!(
                "no FRED API key configured (set {FRED_API_KEY_ENV} or data.fred_api_key)"
            ))
        })?;

        let start_s = start.format("%Y-%m-%d").to_string();
        let end_s = end.format("%Y-%m-%d").to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("series_id", series_id),
                ("api_key", api_key),
                ("file_type", "json"),
                ("observation_start", start_s.as_str()),
                ("observation_end", end_s.as_str()),
            ])
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| DataError::NetworkUnreachable(format!("reading body: {e}")))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(DataError::AuthenticationRequired(format!(
                "FRED rejected the API key (HTTP {})",
                status.as_u16()
            )));
        }
        // FRED reports bad series ids as HTTP 400 with a JSON error body.
        if !status.is_success() && !status.is_client_error() {
            return Err(DataError::HttpStatus {
                series: series_id.to_string(),
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let observations = Self::parse_response(series_id, &body)?;
        tracing::debug!(series_id, count = observations.len(), "FRED fetch ok");
        Ok(FetchResult {
            series_id: series_id.to_string(),
            observations,
            source: DataSource::Fred,
        })
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}
