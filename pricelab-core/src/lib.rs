//! PriceLab Core: ingestion, validation and caching of a daily price series.
//!
//! This crate contains the whole pipeline:
//! - Response normalizer for heterogeneous API/file records
//! - Cleaner enforcing a contiguous, positive, one-point-per-day series
//! - CSV file and remote API ingestion adapters (bounded retry with backoff)
//! - Versioned CSV snapshot cache
//! - Query accessors for the latest price and trailing windows
//! - `PricePipeline`, the single owner of the current Dataset

pub mod config;
pub mod data;
pub mod pipeline;

pub use config::{ConfigError, PipelineConfig};
pub use pipeline::{PriceHistory, PricePipeline};
