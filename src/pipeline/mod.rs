// Batch pipeline: ingestion, processing, dispatch and summary

pub mod dispatch;
pub mod ingestion;
pub mod processing;
pub mod summary;

pub use dispatch::{DispatchReport, NotificationDispatcher, NotificationResult};
pub use processing::partition::Partition;
pub use summary::Summary;
