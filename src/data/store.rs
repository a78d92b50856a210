//! Local series storage
//!
//! Fetched series are cached as zstd-compressed JSON (`<SERIES_ID>.json.zst`)
//! so repeated evaluations and sweeps don't hit the API. Plain `.csv` and
//! `.json` files can be loaded as inputs too.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::series::Series;

const CACHE_SUFFIX: &str = ".json.zst";

/// A row of a CSV or JSON input file; value may be text or a number
#[derive(Debug, Deserialize)]
struct RawRow {
    date: String,
    #[serde(default)]
    value: serde_json::Value,
}

impl RawRow {
    fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }
}

/// `date,value` row; FRED's own download names the date column `observation_date`
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "observation_date")]
    date: String,
    value: String,
}

pub fn cache_path(series_id: &str, cache_dir: &Path) -> PathBuf {
    cache_dir.join(format!("{}{}", series_id, CACHE_SUFFIX))
}

/// Save a series to the cache directory
pub fn save_cache(series: &Series, cache_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(cache_dir)
        .with_context(|| format!("Failed to create cache directory: {:?}", cache_dir))?;
    let path = cache_path(&series.id, cache_dir);

    let json = serde_json::to_vec(series)?;
    let compressed = zstd::encode_all(&json[..], 3)?;
    std::fs::write(&path, compressed)
        .with_context(|| format!("Failed to write cache file: {:?}", path))?;

    debug!("Cached {} observations of {} at {:?}", series.len(), series.id, path);
    Ok(path)
}

/// Load a cached series, `None` if it has never been fetched
pub fn load_cache(series_id: &str, cache_dir: &Path) -> Result<Option<Series>> {
    let path = cache_path(series_id, cache_dir);

    if !path.exists() {
        return Ok(None);
    }

    read_cache_file(&path, series_id).map(Some)
}

fn read_cache_file(path: &Path, series_id: &str) -> Result<Series> {
    let compressed =
        std::fs::read(path).with_context(|| format!("Failed to read cache file: {:?}", path))?;
    let json = zstd::decode_all(&compressed[..])
        .with_context(|| format!("Failed to decompress {:?}", path))?;
    let series: Series = serde_json::from_slice(&json)
        .with_context(|| format!("Failed to parse cached series {:?}", path))?;

    // Re-normalize in case the file was edited by hand
    Ok(Series::new(series_id, series.points))
}

/// Load a series from a `.csv`, `.json` or `.json.zst` file.
///
/// CSV takes `date,value` headers, or any two-column header such as FRED's
/// `observation_date,SP500` read positionally. JSON is an array of
/// `{date, value}`. Missing or non-numeric values are dropped.
pub fn load_file(path: &Path, series_id: &str) -> Result<Series> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let (series, dropped) = if name.ends_with(CACHE_SUFFIX) {
        (read_cache_file(path, series_id)?, 0)
    } else if name.ends_with(".json") {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open file: {:?}", path))?;
        let rows: Vec<RawRow> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse JSON series: {:?}", path))?;
        let values: Vec<String> = rows.iter().map(RawRow::value_text).collect();
        Series::from_raw(
            series_id,
            rows.iter()
                .zip(values.iter())
                .map(|(row, value)| (row.date.as_str(), value.as_str())),
        )
    } else if name.ends_with(".csv") {
        let rows = read_csv_rows(path)?;
        Series::from_raw(
            series_id,
            rows.iter().map(|r| (r.date.as_str(), r.value.as_str())),
        )
    } else {
        bail!("Unsupported series file {:?} (expected .csv, .json or .json.zst)", path);
    };

    if dropped > 0 {
        warn!("{:?}: dropped {} missing or non-numeric rows", path, dropped);
    }
    info!("Loaded {} observations of {} from {:?}", series.len(), series_id, path);

    Ok(series)
}

fn read_csv_rows(path: &Path) -> Result<Vec<CsvRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open file: {:?}", path))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header in {:?}", path))?
        .clone();

    let mut rows = Vec::new();

    if headers.iter().any(|h| h == "value") {
        for result in reader.deserialize() {
            let row: CsvRow = result.with_context(|| format!("Failed to parse CSV row in {:?}", path))?;
            rows.push(row);
        }
        return Ok(rows);
    }

    if headers.len() < 2 {
        bail!("{:?}: expected a date column and a value column, got {:?}", path, headers);
    }
    debug!("{:?}: no `value` column, reading {:?} positionally", path, headers);

    for result in reader.records() {
        let record = result.with_context(|| format!("Failed to parse CSV row in {:?}", path))?;
        rows.push(CsvRow {
            date: record.get(0).unwrap_or_default().to_string(),
            value: record.get(1).unwrap_or_default().to_string(),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::TimePoint;
    use chrono::NaiveDate;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vix_regime_{}_{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_cache_save_and_load() {
        let dir = temp_dir("cache");
        let series = Series::new(
            "VIXCLS",
            vec![
                TimePoint { date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), value: 13.2 },
                TimePoint { date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), value: 14.0 },
            ],
        );

        assert!(load_cache("VIXCLS", &dir).unwrap().is_none());
        save_cache(&series, &dir).unwrap();
        let loaded = load_cache("VIXCLS", &dir).unwrap().unwrap();
        assert_eq!(loaded, series);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_csv_with_missing_values() {
        let dir = temp_dir("csv");
        let path = dir.join("sp500.csv");
        std::fs::write(
            &path,
            "date,value\n2024-01-02,4742.83\n2024-01-03,.\n2024-01-04,4688.68\n",
        )
        .unwrap();

        let series = load_file(&path, "SP500").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.values(), vec![4742.83, 4688.68]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_fred_download_csv() {
        let dir = temp_dir("fred_csv");
        let path = dir.join("SP500.csv");
        std::fs::write(
            &path,
            "observation_date,SP500\n2024-01-02,4742.83\n2024-01-03,\n2024-01-04,4688.68\n",
        )
        .unwrap();

        let series = load_file(&path, "SP500").unwrap();
        assert_eq!(series.values(), vec![4742.83, 4688.68]);
        assert_eq!(series.first().unwrap().date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_csv_observation_date_alias() {
        let dir = temp_dir("alias_csv");
        let path = dir.join("vix.csv");
        std::fs::write(&path, "observation_date,value\n2024-01-02,13.20\n2024-01-03,14.04\n").unwrap();

        let series = load_file(&path, "VIXCLS").unwrap();
        assert_eq!(series.values(), vec![13.2, 14.04]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_single_column_csv_is_rejected() {
        let dir = temp_dir("narrow_csv");
        let path = dir.join("narrow.csv");
        std::fs::write(&path, "date\n2024-01-02\n").unwrap();

        assert!(load_file(&path, "X").is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_json_mixed_values() {
        let dir = temp_dir("json");
        let path = dir.join("VIXCLS.json");
        std::fs::write(
            &path,
            r#"[{"date": "2024-01-03", "value": "14.0"},
                {"date": "2024-01-02", "value": 13.2},
                {"date": "2024-01-04", "value": "."},
                {"date": "2024-01-05", "value": null}]"#,
        )
        .unwrap();

        let series = load_file(&path, "VIXCLS").unwrap();
        assert_eq!(series.values(), vec![13.2, 14.0]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(load_file(Path::new("series.parquet"), "X").is_err());
    }
}
