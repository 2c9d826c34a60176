//! Versioned CSV snapshot cache.
//!
//! Layout: `{cache_dir}/pi_price_data_{tag}.csv` plus a metadata sidecar
//! `{cache_dir}/pi_price_data_{tag}.meta.json`.
//!
//! - one tag maps to exactly one snapshot; writing a tag replaces it
//! - writes stage both files as `.tmp`, then rename the snapshot first; the
//!   snapshot rename is the commit point and the sidecar is advisory
//! - loads are validated against the Dataset invariants
//! - single writer per tag is assumed, not enforced

use super::provider::DataError;
use super::schema::{Dataset, PricePoint, VersionTag};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const FILE_PREFIX: &str = "pi_price_data_";

/// Metadata sidecar for a cached snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub tag: VersionTag,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub point_count: usize,
    pub data_hash: String,
    pub source: String,
    pub cached_at: chrono::DateTime<chrono::Utc>,
}

/// Cache status for a single tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub tag: VersionTag,
    pub cached: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub point_count: Option<usize>,
}

/// On-disk row format.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    timestamp: NaiveDate,
    price: f64,
}

/// The snapshot cache.
#[derive(Debug, Clone)]
pub struct VersionCache {
    cache_dir: PathBuf,
}

impl VersionCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// `{cache_dir}/pi_price_data_{tag}.csv`
    pub fn data_path(&self, tag: &VersionTag) -> PathBuf {
        self.cache_dir.join(format!("{FILE_PREFIX}{tag}.csv"))
    }

    fn meta_path(&self, tag: &VersionTag) -> PathBuf {
        self.cache_dir.join(format!("{FILE_PREFIX}{tag}.meta.json"))
    }

    /// Replace the snapshot for `tag` with `dataset`.
    pub fn persist(
        &self,
        tag: &VersionTag,
        dataset: &Dataset,
        source: &str,
    ) -> Result<CacheMeta, DataError> {
        let (Some(start_date), Some(end_date)) = (dataset.first_date(), dataset.last_date()) else {
            return Err(DataError::Validation("refusing to cache an empty series".into()));
        };

        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| DataError::Cache(format!("failed to create dir: {e}")))?;

        let meta = CacheMeta {
            tag: tag.clone(),
            start_date,
            end_date,
            point_count: dataset.len(),
            data_hash: dataset.content_hash(),
            source: source.to_string(),
            cached_at: chrono::Utc::now(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::Cache(format!("meta serialization: {e}")))?;

        // Stage both files, then rename the snapshot last: it is the commit
        // point, so any earlier failure leaves the previous snapshot in place.
        let path = self.data_path(tag);
        let tmp_path = path.with_extension("csv.tmp");
        let meta_path = self.meta_path(tag);
        let meta_tmp = meta_path.with_extension("json.tmp");

        write_rows(&tmp_path, dataset).map_err(|e| {
            discard(&tmp_path);
            e
        })?;
        fs::write(&meta_tmp, meta_json).map_err(|e| {
            discard(&meta_tmp);
            discard(&tmp_path);
            DataError::Cache(format!("meta write: {e}"))
        })?;
        replace(&tmp_path, &path).map_err(|e| {
            discard(&meta_tmp);
            e
        })?;

        // The snapshot is committed; a stale or missing sidecar only costs
        // the hash check on load.
        if let Err(e) = replace(&meta_tmp, &meta_path) {
            warn!(tag = %tag, error = %e, "snapshot written but metadata sidecar was not updated");
            let _ = fs::remove_file(&meta_path);
        }

        info!(tag = %tag, points = meta.point_count, path = %path.display(), "cached price series");
        Ok(meta)
    }

    /// Load the snapshot for `tag`, or `None` if it was never written.
    pub fn load(&self, tag: &VersionTag) -> Result<Option<Dataset>, DataError> {
        let path = self.data_path(tag);
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| DataError::Cache(format!("open {}: {e}", path.display())))?;
        let mut points = Vec::new();
        for row in reader.deserialize::<CacheRow>() {
            let row = row.map_err(|e| {
                DataError::Cache(format!("corrupt snapshot {}: {e}", path.display()))
            })?;
            points.push(PricePoint::new(row.timestamp, row.price));
        }
        if points.is_empty() {
            return Err(DataError::Cache(format!("empty snapshot {}", path.display())));
        }

        let dataset = Dataset::new(points).map_err(|e| {
            DataError::Cache(format!("invalid snapshot {}: {e}", path.display()))
        })?;

        if let Some(meta) = self.meta(tag) {
            if meta.data_hash != dataset.content_hash() {
                warn!(tag = %tag, "snapshot hash differs from metadata sidecar");
            }
        }
        Ok(Some(dataset))
    }

    /// Metadata for a tag, if a readable sidecar exists.
    pub fn meta(&self, tag: &VersionTag) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(tag)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Summarise several tags.
    pub fn status(&self, tags: &[VersionTag]) -> Vec<CacheStatus> {
        tags.iter()
            .map(|tag| {
                let meta = self.meta(tag);
                CacheStatus {
                    tag: tag.clone(),
                    cached: self.data_path(tag).exists(),
                    start_date: meta.as_ref().map(|m| m.start_date),
                    end_date: meta.as_ref().map(|m| m.end_date),
                    point_count: meta.as_ref().map(|m| m.point_count),
                }
            })
            .collect()
    }

    /// Every tag with a snapshot file in the cache directory, sorted.
    pub fn tags(&self) -> Vec<VersionTag> {
        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };
        let mut tags: Vec<VersionTag> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                let tag = name.strip_prefix(FILE_PREFIX)?.strip_suffix(".csv")?;
                VersionTag::new(tag).ok()
            })
            .collect();
        tags.sort();
        tags
    }
}

fn write_rows(path: &Path, dataset: &Dataset) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| DataError::Cache(format!("create {}: {e}", path.display())))?;
    for p in dataset.points() {
        writer
            .serialize(CacheRow {
                timestamp: p.date,
                price: p.price,
            })
            .map_err(|e| DataError::Cache(format!("write row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| DataError::Cache(format!("flush: {e}")))
}

fn replace(tmp_path: &Path, path: &Path) -> Result<(), DataError> {
    fs::rename(tmp_path, path).map_err(|e| {
        discard(tmp_path);
        DataError::Cache(format!("atomic rename failed: {e}"))
    })
}

fn discard(tmp_path: &Path) {
    let _ = fs::remove_file(tmp_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tag(s: &str) -> VersionTag {
        VersionTag::new(s).unwrap()
    }

    fn sample(start_price: f64) -> Dataset {
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        Dataset::new(
            start
                .iter_days()
                .take(4)
                .enumerate()
                .map(|(i, d)| PricePoint::new(d, start_price + i as f64 * 0.1))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn persist_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = VersionCache::new(dir.path());
        let ds = sample(0.314159);

        cache.persist(&tag("v1"), &ds, "test").unwrap();
        let loaded = cache.load(&tag("v1")).unwrap().unwrap();

        assert_eq!(loaded.len(), ds.len());
        for (a, b) in loaded.points().iter().zip(ds.points()) {
            assert_eq!(a.date, b.date);
            assert!((a.price - b.price).abs() < 1e-6);
        }
        assert!(dir.path().join("pi_price_data_v1.csv").exists());
    }

    #[test]
    fn file_has_timestamp_price_header() {
        let dir = TempDir::new().unwrap();
        let cache = VersionCache::new(dir.path());
        cache.persist(&tag("v1"), &sample(1.0), "test").unwrap();
        let text = fs::read_to_string(cache.data_path(&tag("v1"))).unwrap();
        assert!(text.starts_with("timestamp,price\n2024-02-27,1"));
    }

    #[test]
    fn missing_tag_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let cache = VersionCache::new(dir.path().join("never-created"));
        assert!(cache.load(&tag("v9")).unwrap().is_none());
    }

    #[test]
    fn overwrite_replaces_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let cache = VersionCache::new(dir.path());
        cache.persist(&tag("v1"), &sample(1.0), "test").unwrap();
        cache.persist(&tag("v1"), &sample(5.0), "test").unwrap();

        let loaded = cache.load(&tag("v1")).unwrap().unwrap();
        assert_eq!(loaded.points()[0].price, 5.0);
        assert_eq!(cache.tags(), vec![tag("v1")]);
    }

    #[test]
    fn tags_are_independent() {
        let dir = TempDir::new().unwrap();
        let cache = VersionCache::new(dir.path());
        cache.persist(&tag("a"), &sample(1.0), "test").unwrap();
        cache.persist(&tag("b"), &sample(2.0), "test").unwrap();

        assert_eq!(cache.load(&tag("a")).unwrap().unwrap().points()[0].price, 1.0);
        assert_eq!(cache.tags(), vec![tag("a"), tag("b")]);
    }

    #[test]
    fn empty_dataset_is_refused() {
        let dir = TempDir::new().unwrap();
        let cache = VersionCache::new(dir.path());
        let err = cache.persist(&tag("v1"), &Dataset::empty(), "test").unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
        assert!(!cache.data_path(&tag("v1")).exists());
    }

    #[test]
    fn meta_and_status() {
        let dir = TempDir::new().unwrap();
        let cache = VersionCache::new(dir.path());
        let ds = sample(1.0);
        cache.persist(&tag("v1"), &ds, "csv_import").unwrap();

        let meta = cache.meta(&tag("v1")).unwrap();
        assert_eq!(meta.point_count, 4);
        assert_eq!(meta.source, "csv_import");
        assert_eq!(meta.data_hash, ds.content_hash());

        let status = cache.status(&[tag("v1"), tag("v2")]);
        assert!(status[0].cached);
        assert_eq!(status[0].point_count, Some(4));
        assert!(!status[1].cached);
    }

    #[test]
    fn corrupt_snapshot_is_cache_error() {
        let dir = TempDir::new().unwrap();
        let cache = VersionCache::new(dir.path());
        fs::write(
            cache.data_path(&tag("v1")),
            "timestamp,price\n2024-01-01,1.0\n2024-01-05,2.0\n",
        )
        .unwrap();
        assert!(matches!(cache.load(&tag("v1")), Err(DataError::Cache(_))));

        fs::write(cache.data_path(&tag("v1")), "timestamp,price\nxx,1.0\n").unwrap();
        assert!(matches!(cache.load(&tag("v1")), Err(DataError::Cache(_))));
    }

    #[test]
    fn sidecar_failure_does_not_fail_a_committed_snapshot() {
        let dir = TempDir::new().unwrap();
        let cache = VersionCache::new(dir.path());
        cache.persist(&tag("v1"), &sample(1.0), "test").unwrap();

        // A non-empty directory where the sidecar lives makes its rename fail.
        let meta_path = cache.meta_path(&tag("v1"));
        fs::remove_file(&meta_path).unwrap();
        fs::create_dir(&meta_path).unwrap();
        fs::write(meta_path.join("blocker"), "x").unwrap();

        let meta = cache.persist(&tag("v1"), &sample(5.0), "test").unwrap();
        assert_eq!(meta.point_count, 4);

        let loaded = cache.load(&tag("v1")).unwrap().unwrap();
        assert_eq!(loaded.points()[0].price, 5.0);
        assert!(!meta_path.with_extension("json.tmp").exists());
    }

    #[test]
    fn failed_snapshot_write_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let cache = VersionCache::new(dir.path());
        cache.persist(&tag("v1"), &sample(1.0), "test").unwrap();
        let before = fs::read_to_string(cache.data_path(&tag("v1"))).unwrap();
        let meta_before = cache.meta(&tag("v1")).unwrap();

        // Occupy the staging path so the snapshot cannot be written.
        let tmp_path = cache.data_path(&tag("v1")).with_extension("csv.tmp");
        fs::create_dir(&tmp_path).unwrap();

        let err = cache.persist(&tag("v1"), &sample(5.0), "test").unwrap_err();
        assert!(matches!(err, DataError::Cache(_)));
        assert_eq!(fs::read_to_string(cache.data_path(&tag("v1"))).unwrap(), before);
        assert_eq!(cache.meta(&tag("v1")).unwrap(), meta_before);
    }
}
