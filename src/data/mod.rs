//! Input series: FRED download, local cache and file loading

pub mod fred;
pub mod store;

pub use fred::{FredClient, SP500_SERIES, VIX_SERIES};

use anyhow::{bail, Result};
use chrono::NaiveDate;
use std::path::Path;
use tracing::info;

use crate::series::Series;

/// Where a series should come from
pub enum Source<'a> {
    /// Explicit file on disk
    File(&'a Path),
    /// Cache only; fails if the series has never been fetched
    Cache,
    /// Download from FRED, optionally from a start date, and refresh the cache
    Fred(&'a FredClient, Option<NaiveDate>),
}

/// Obtain a series from the requested source
pub async fn obtain_series(series_id: &str, source: Source<'_>, cache_dir: &Path) -> Result<Series> {
    match source {
        Source::File(path) => store::load_file(path, series_id),
        Source::Cache => match store::load_cache(series_id, cache_dir)? {
            Some(series) => {
                info!("Loaded {} observations of {} from cache", series.len(), series_id);
                Ok(series)
            }
            None => bail!(
                "No cached data for {} in {:?}. Run 'fetch' first.",
                series_id,
                cache_dir
            ),
        },
        Source::Fred(client, start) => {
            let series = client.fetch_series(series_id, start).await?;
            let path = store::save_cache(&series, cache_dir)?;
            info!("Saved {} observations of {} to {:?}", series.len(), series_id, path);
            Ok(series)
        }
    }
}
