//! Data ingestion, cleaning and caching

pub mod api;
pub mod backoff;
pub mod cache;
pub mod clean;
pub mod ingest;
pub mod normalize;
pub mod provider;
pub mod query;
pub mod schema;

pub use api::{ApiClient, ApiRequest, HttpTransport, ReqwestTransport};
pub use backoff::{Backoff, CancelToken, RecordingBackoff, ThreadSleep};
pub use cache::{CacheMeta, CacheStatus, VersionCache};
pub use clean::CleanReport;
pub use normalize::RawPoint;
pub use provider::{AttemptError, DataError, DataSource};
pub use schema::{Dataset, PricePoint, VersionTag};
