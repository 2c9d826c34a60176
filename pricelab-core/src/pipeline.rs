//! The pipeline object: owns the current Dataset and its cache tag.
//!
//! Construct one per process and pass it by reference to whatever needs
//! prices. Ingestion methods take `&mut self`, so at most one ingestion can be
//! in flight per instance.
//!
//! Commit order on every successful ingestion: persist the new Dataset to the
//! cache, then swap it into memory. Any error before the swap leaves both the
//! in-memory Dataset and the cache snapshot as they were.

use crate::config::{ConfigError, PipelineConfig};
use crate::data::api::{ApiClient, ApiRequest};
use crate::data::backoff::CancelToken;
use crate::data::cache::VersionCache;
use crate::data::ingest::ingest_csv;
use crate::data::provider::{DataError, DataSource};
use crate::data::query;
use crate::data::schema::{Dataset, PricePoint, VersionTag};
use std::path::Path;
use tracing::info;

/// Read access to a price history, as consumed by a prediction component.
pub trait PriceHistory {
    /// Most recent price, or `None` when nothing is loaded.
    fn latest_price(&self) -> Option<f64>;

    /// Trailing `min(days, len)` prices, oldest first; `None` when nothing is loaded.
    fn historical_prices(&self, days: usize) -> Option<Vec<f64>>;
}

pub struct PricePipeline {
    cache: VersionCache,
    tag: VersionTag,
    api: ApiClient,
    dataset: Option<Dataset>,
    source: Option<DataSource>,
}

impl PricePipeline {
    pub fn new(cache: VersionCache, tag: VersionTag, api: ApiClient) -> Self {
        Self {
            cache,
            tag,
            api,
            dataset: None,
            source: None,
        }
    }

    pub fn from_config(config: &PipelineConfig, api: ApiClient) -> Result<Self, ConfigError> {
        Ok(Self::new(
            VersionCache::new(&config.cache_dir),
            config.version_tag()?,
            api,
        ))
    }

    pub fn tag(&self) -> &VersionTag {
        &self.tag
    }

    pub fn cache(&self) -> &VersionCache {
        &self.cache
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// Where the current Dataset came from.
    pub fn source(&self) -> Option<DataSource> {
        self.source
    }

    /// Ingest a CSV file, replace the current Dataset and persist it.
    pub fn load_from_csv(&mut self, path: &Path) -> Result<&Dataset, DataError> {
        let (dataset, _) = ingest_csv(path)?;
        self.commit(dataset, DataSource::CsvImport)
    }

    /// Fetch from the API, replace the current Dataset and persist it.
    pub fn fetch_from_api(&mut self, req: &ApiRequest) -> Result<&Dataset, DataError> {
        let (dataset, _) = self.api.fetch_dataset(req, None)?;
        self.commit(dataset, DataSource::Api)
    }

    /// Like [`fetch_from_api`](Self::fetch_from_api), but gives up with
    /// [`DataError::Cancelled`] once `cancel` is set.
    pub fn fetch_from_api_cancellable(
        &mut self,
        req: &ApiRequest,
        cancel: &CancelToken,
    ) -> Result<&Dataset, DataError> {
        let (dataset, _) = self.api.fetch_dataset(req, Some(cancel))?;
        self.commit(dataset, DataSource::Api)
    }

    /// Replace the current Dataset with the cached snapshot for this tag.
    ///
    /// Returns `Ok(None)` and keeps the current Dataset if no snapshot exists.
    pub fn load_cache(&mut self) -> Result<Option<&Dataset>, DataError> {
        match self.cache.load(&self.tag)? {
            Some(dataset) => {
                info!(tag = %self.tag, points = dataset.len(), "loaded cached price series");
                self.source = Some(DataSource::Cache);
                let dataset: &Dataset = self.dataset.insert(dataset);
                Ok(Some(dataset))
            }
            None => Ok(None),
        }
    }

    /// Trailing `min(days, len)` points with their dates.
    pub fn historical_points(&self, days: usize) -> Option<&[PricePoint]> {
        query::historical_points(self.dataset.as_ref(), days)
    }

    fn commit(&mut self, dataset: Dataset, source: DataSource) -> Result<&Dataset, DataError> {
        self.cache.persist(&self.tag, &dataset, source.as_str())?;
        self.source = Some(source);
        let dataset: &Dataset = self.dataset.insert(dataset);
        Ok(dataset)
    }
}

impl PriceHistory for PricePipeline {
    fn latest_price(&self) -> Option<f64> {
        query::latest_price(self.dataset.as_ref())
    }

    fn historical_prices(&self, days: usize) -> Option<Vec<f64>> {
        query::historical_prices(self.dataset.as_ref(), days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::backoff::ThreadSleep;
    use crate::data::provider::AttemptError;
    use crate::data::HttpTransport;
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::TempDir;

    struct AlwaysDown;

    impl HttpTransport for AlwaysDown {
        fn get_json(
            &self,
            _url: &str,
            _params: &[(String, String)],
            _timeout: Duration,
        ) -> Result<Value, AttemptError> {
            Err(AttemptError::Network("down".into()))
        }
    }

    fn pipeline(dir: &TempDir) -> PricePipeline {
        PricePipeline::new(
            VersionCache::new(dir.path()),
            VersionTag::new("v1").unwrap(),
            ApiClient::new(Box::new(AlwaysDown), Box::new(ThreadSleep)),
        )
    }

    #[test]
    fn fresh_pipeline_has_nothing_loaded() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(&dir);
        assert!(p.dataset().is_none());
        assert_eq!(p.latest_price(), None);
        assert_eq!(p.historical_prices(3), None);
        assert_eq!(p.source(), None);
    }

    #[test]
    fn missing_cache_keeps_current_state() {
        let dir = TempDir::new().unwrap();
        let mut p = pipeline(&dir);
        assert!(p.load_cache().unwrap().is_none());
        assert!(p.dataset().is_none());
    }

    #[test]
    fn single_attempt_failure_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let mut p = pipeline(&dir);
        let err = p
            .fetch_from_api(&ApiRequest::new("http://x").max_retries(1))
            .unwrap_err();
        assert!(matches!(err, DataError::Fetch { attempts: 1, .. }));
        assert!(p.dataset().is_none());
        assert!(p.cache().tags().is_empty());
    }
}
