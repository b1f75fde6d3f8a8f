// Tick -> candle aggregation with watermark-based completion
pub mod aggregator;
pub mod bucket;

pub use aggregator::CandleAggregator;
pub use bucket::{bucket_start, is_complete, watermark, BucketSet};
