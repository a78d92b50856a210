//! FRED API Client
//!
//! Downloads daily observations (`VIXCLS`, `SP500`, ...) from the St. Louis
//! Fed series/observations endpoint.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::series::Series;

pub const FRED_BASE_URL: &str = "https://api.stlouisfed.org/fred";

/// Volatility indicator (CBOE VIX close)
pub const VIX_SERIES: &str = "VIXCLS";

/// Underlying index (S&P 500 close)
pub const SP500_SERIES: &str = "SP500";

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

/// `config.json` layout
#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    pub fred_api_key: Option<String>,
}

/// Resolve the API key: explicit value (flag or `FRED_API_KEY`) first, then
/// `fred_api_key` in the JSON config file.
pub fn resolve_api_key(explicit: Option<String>, config_path: &Path) -> Result<String> {
    if let Some(key) = explicit.filter(|k| !k.trim().is_empty()) {
        return Ok(key);
    }

    let raw = std::fs::read_to_string(config_path).with_context(|| {
        format!(
            "FRED_API_KEY not set and config file {:?} could not be read",
            config_path
        )
    })?;
    let config: ConfigFile = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {:?}", config_path))?;

    config
        .fred_api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("fred_api_key missing from {:?}", config_path))
}

/// FRED observations client
pub struct FredClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FredClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, FRED_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Fetch observations of a series, from `observation_start` onwards when
    /// given, otherwise the full history.
    ///
    /// Missing observations (".") are dropped.
    pub async fn fetch_series(
        &self,
        series_id: &str,
        observation_start: Option<NaiveDate>,
    ) -> Result<Series> {
        info!("Fetching {} from FRED...", series_id);

        let mut query: Vec<(&str, String)> = vec![
            ("series_id", series_id.to_string()),
            ("api_key", self.api_key.clone()),
            ("file_type", "json".to_string()),
        ];
        if let Some(start) = observation_start {
            query.push(("observation_start", start.format("%Y-%m-%d").to_string()));
        }

        let response = self
            .client
            .get(format!("{}/series/observations", self.base_url))
            .header("Accept", "application/json")
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Failed to send request for {}", series_id))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("FRED request for {} failed ({}): {}", series_id, status, body));
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read FRED response body for {}", series_id))?;

        let series = parse_observations(series_id, &body)?;
        debug!(
            "{}: {} observations, range {:?}",
            series_id,
            series.len(),
            series.date_range()
        );
        Ok(series)
    }
}

/// Parse a series/observations JSON body
pub fn parse_observations(series_id: &str, body: &str) -> Result<Series> {
    let response: ObservationsResponse = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse FRED response for {}", series_id))?;

    if let Some(message) = response.error_message {
        return Err(anyhow!("FRED error for {}: {}", series_id, message));
    }

    let (series, dropped) = Series::from_raw(
        series_id,
        response
            .observations
            .iter()
            .map(|o| (o.date.as_str(), o.value.as_str())),
    );

    if dropped > 0 {
        warn!("{}: dropped {} missing or non-numeric observations", series_id, dropped);
    }

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the request head
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });

        (base_url, handle)
    }

    const BODY: &str = r#"{
        "realtime_start": "2024-05-01",
        "realtime_end": "2024-05-01",
        "count": 4,
        "observations": [
            {"realtime_start": "2024-05-01", "realtime_end": "2024-05-01", "date": "2024-04-26", "value": "15.03"},
            {"realtime_start": "2024-05-01", "realtime_end": "2024-05-01", "date": "2024-04-29", "value": "14.67"},
            {"realtime_start": "2024-05-01", "realtime_end": "2024-05-01", "date": "2024-04-30", "value": "."},
            {"realtime_start": "2024-05-01", "realtime_end": "2024-05-01", "date": "2024-05-01", "value": "15.39"}
        ]
    }"#;

    #[test]
    fn test_parse_observations_drops_missing() {
        let series = parse_observations(VIX_SERIES, BODY).unwrap();
        assert_eq!(series.id, "VIXCLS");
        assert_eq!(series.len(), 3);
        assert_eq!(series.values(), vec![15.03, 14.67, 15.39]);
    }

    #[test]
    fn test_parse_error_message() {
        let body = r#"{"error_code": 400, "error_message": "Bad Request. The value for variable api_key is not registered."}"#;
        let err = parse_observations(SP500_SERIES, body).unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[tokio::test]
    async fn test_fetch_series_sends_start_date() {
        let (base_url, server) = serve_once("200 OK", BODY).await;
        let client = FredClient::with_base_url("test-key".to_string(), base_url).unwrap();

        let start = NaiveDate::from_ymd_opt(2024, 4, 26).unwrap();
        let series = client.fetch_series(VIX_SERIES, Some(start)).await.unwrap();
        assert_eq!(series.len(), 3);

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("GET /series/observations?"));
        assert!(request_line.contains("series_id=VIXCLS"));
        assert!(request_line.contains("api_key=test-key"));
        assert!(request_line.contains("observation_start=2024-04-26"));
    }

    #[tokio::test]
    async fn test_fetch_series_without_start_date() {
        let (base_url, server) = serve_once("200 OK", BODY).await;
        let client = FredClient::with_base_url("test-key".to_string(), base_url).unwrap();

        client.fetch_series(VIX_SERIES, None).await.unwrap();

        let request = server.await.unwrap();
        assert!(!request.contains("observation_start"));
    }

    #[tokio::test]
    async fn test_fetch_series_http_error() {
        let (base_url, server) = serve_once("400 Bad Request", r#"{"error_message": "Bad Request."}"#).await;
        let client = FredClient::with_base_url("test-key".to_string(), base_url).unwrap();

        let err = client.fetch_series(SP500_SERIES, None).await.unwrap_err();
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("Bad Request."));
        server.await.unwrap();
    }

    #[test]
    fn test_resolve_api_key() {
        let missing = Path::new("/nonexistent/config.json");
        assert_eq!(resolve_api_key(Some("abc".to_string()), missing).unwrap(), "abc");
        assert!(resolve_api_key(None, missing).is_err());
        assert!(resolve_api_key(Some("  ".to_string()), missing).is_err());

        let path = std::env::temp_dir().join(format!("vix_regime_config_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"fred_api_key": "from-file"}"#).unwrap();
        assert_eq!(resolve_api_key(None, &path).unwrap(), "from-file");
        std::fs::remove_file(&path).ok();
    }
}
