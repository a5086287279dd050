

/// Full-controller protocol tests driven through the harness.
pub mod dispatcher;




/// Statistic counters and latency means.
pub mod stats;
