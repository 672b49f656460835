// Observability: pipeline metrics

pub mod metrics;

pub use metrics::{init, render};
