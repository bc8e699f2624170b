//! Task health assessment.
//!
//! Two complementary views of the same backlog:
//!
//! - [`scorer`] - a continuous 0-100 weighted composite score per task
//! - [`monitor`] - discrete, typed anomaly detection against thresholds
//!
//! Both are pure over their inputs: the caller threads in the task
//! collection, the task's event history, and an explicit `now`, so
//! time-based thresholds are deterministic under test.

pub mod monitor;
pub mod scorer;

pub use monitor::{
    HealthMonitor, HealthReport, Issue, IssueKind, MonitorThresholds, NoRevertHistory,
    RevertHistory, Severity, TaskHealth,
};
pub use scorer::{
    FactorScores, HealthScore, HealthScorer, HealthStatus, Recommendation, RecommendationKind,
    ScoreWeights,
};
