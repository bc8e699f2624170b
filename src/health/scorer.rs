//! Weighted composite health scoring.
//!
//! Seven independently-scored factors (each 0-100) combine through a
//! fixed weight vector into a single 0-100 score per task, with a status
//! bucket and per-factor recommendations. Scoring is a pure function of
//! the task, the full collection (for cross-task dependency checks), the
//! task's event history, and an explicit `now` - no mutation, no clock
//! reads, callable at any rate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::monitor::Severity;
use crate::store::events::EventRecord;
use crate::store::EventKind;
use crate::task::{Task, TaskStatus};

/// File name fragments that count as test evidence.
const TEST_PATTERNS: &[&str] = &["test", "spec", "__tests__"];

/// File name fragments that count as documentation evidence.
const DOC_PATTERNS: &[&str] = &["readme", "docs", ".md", "documentation"];

// ============================================================================
// Weights
// ============================================================================

/// Factor weight vector; must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub progress_velocity: f64,
    pub implementation: f64,
    pub dependencies: f64,
    pub time_efficiency: f64,
    pub blockage_risk: f64,
    pub communication: f64,
    pub quality: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            progress_velocity: 0.20,
            implementation: 0.25,
            dependencies: 0.15,
            time_efficiency: 0.15,
            blockage_risk: 0.10,
            communication: 0.10,
            quality: 0.05,
        }
    }
}

impl ScoreWeights {
    /// Sum of all weights; 1.0 for a well-formed vector.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.progress_velocity
            + self.implementation
            + self.dependencies
            + self.time_efficiency
            + self.blockage_risk
            + self.communication
            + self.quality
    }
}

// ============================================================================
// Score Types
// ============================================================================

/// Per-factor scores, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorScores {
    pub progress_velocity: f64,
    pub implementation: f64,
    pub dependencies: f64,
    pub time_efficiency: f64,
    pub blockage_risk: f64,
    pub communication: f64,
    pub quality: f64,
}

/// Bucketed interpretation of the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthStatus {
    /// Bucket a composite score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            HealthStatus::Excellent
        } else if score >= 80.0 {
            HealthStatus::Good
        } else if score >= 60.0 {
            HealthStatus::Fair
        } else if score >= 40.0 {
            HealthStatus::Poor
        } else {
            HealthStatus::Critical
        }
    }
}

/// Factor a recommendation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Velocity,
    Implementation,
    Dependencies,
    Communication,
}

/// Actionable advice attached to a low-scoring factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub priority: Severity,
    pub message: String,
    pub action: String,
}

/// Composite result for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthScore {
    /// Weighted composite, rounded to the nearest point
    pub overall: u8,
    pub breakdown: FactorScores,
    pub status: HealthStatus,
    pub recommendations: Vec<Recommendation>,
}

// ============================================================================
// Scorer
// ============================================================================

/// Computes weighted composite health scores.
#[derive(Debug, Clone, Default)]
pub struct HealthScorer {
    weights: ScoreWeights,
}

impl HealthScorer {
    /// Create a scorer with the standard weight vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scorer with a custom weight vector.
    #[must_use]
    pub fn with_weights(weights: ScoreWeights) -> Self {
        debug_assert!((weights.total() - 1.0).abs() < 1e-9, "weights must sum to 1.0");
        Self { weights }
    }

    /// Score one task against the collection and its event history.
    #[must_use]
    pub fn score(
        &self,
        task: &Task,
        all_tasks: &[Task],
        events: &[EventRecord],
        now: DateTime<Utc>,
    ) -> HealthScore {
        let breakdown = FactorScores {
            progress_velocity: score_progress_velocity(task, now),
            implementation: score_implementation(task),
            dependencies: score_dependencies(task, all_tasks),
            time_efficiency: score_time_efficiency(task, now),
            blockage_risk: score_blockage_risk(task, events, now),
            communication: score_communication(task, events, now),
            quality: score_quality(task, events),
        };

        let total = breakdown.progress_velocity * self.weights.progress_velocity
            + breakdown.implementation * self.weights.implementation
            + breakdown.dependencies * self.weights.dependencies
            + breakdown.time_efficiency * self.weights.time_efficiency
            + breakdown.blockage_risk * self.weights.blockage_risk
            + breakdown.communication * self.weights.communication
            + breakdown.quality * self.weights.quality;

        HealthScore {
            overall: total.round().clamp(0.0, 100.0) as u8,
            breakdown,
            status: HealthStatus::from_score(total),
            recommendations: recommendations(&breakdown),
        }
    }
}

// ============================================================================
// Factor Scoring
// ============================================================================

/// Actual vs. expected progress at 2% per hour since start.
fn score_progress_velocity(task: &Task, now: DateTime<Utc>) -> f64 {
    if matches!(task.status, TaskStatus::NotStarted | TaskStatus::Completed) {
        return 100.0;
    }

    let age = task.age_hours(now);
    if age <= 0.0 {
        return 100.0;
    }

    let expected = (age * 2.0).min(100.0);
    let velocity = f64::from(task.progress) / expected * 100.0;
    velocity.clamp(0.0, 100.0)
}

/// Alignment between recorded file evidence and stated progress.
fn score_implementation(task: &Task) -> f64 {
    if task.status == TaskStatus::NotStarted {
        return 100.0;
    }

    // A verified task is trusted completely.
    if task.implementation_notes.verified {
        return 100.0;
    }

    let recorded = task.implementation_notes.recorded_file_count();

    if task.status == TaskStatus::Completed {
        if task.implementation_notes.do_not_revert {
            return 100.0;
        }
        if task.progress == 100 {
            return 90.0;
        }
        return if recorded > 0 { 100.0 } else { 20.0 };
    }

    // In-progress: penalize divergence between the file-creation ratio
    // and the stated percentage.
    let planned_creates = task.implementation_notes.files_to_create.len().max(1);
    let expected = planned_creates + task.implementation_notes.files_to_modify.len();
    let ratio = recorded as f64 / expected.max(1) as f64;
    let alignment = (ratio - f64::from(task.progress) / 100.0).abs();
    (100.0 - alignment * 100.0).max(0.0)
}

/// Health of the blocker set: stale, unstarted, or barely-started
/// blockers each subtract from 100.
fn score_dependencies(task: &Task, all_tasks: &[Task]) -> f64 {
    if task.dependencies.blocked_by.is_empty() {
        return 100.0;
    }

    let mut score: f64 = 100.0;
    for blocker_id in &task.dependencies.blocked_by {
        let Some(blocker) = all_tasks.iter().find(|t| t.id == *blocker_id) else {
            continue;
        };
        if blocker.status == TaskStatus::Completed {
            // Completed but still listed: stale dependency data.
            score -= 20.0;
        } else if blocker.status == TaskStatus::NotStarted {
            score -= 30.0;
        } else if blocker.progress < 50 {
            score -= 15.0;
        }
    }
    score.max(0.0)
}

/// Estimated vs. actual hours (completed) or progress pace (in-progress).
fn score_time_efficiency(task: &Task, now: DateTime<Utc>) -> f64 {
    if task.status == TaskStatus::NotStarted {
        return 100.0;
    }
    let Some(estimated) = task.estimates.effort_hours else {
        return 75.0;
    };

    let actual = task.age_hours(now);

    if task.status == TaskStatus::Completed {
        let efficiency = estimated / actual.max(1.0);
        return (efficiency * 100.0).min(100.0);
    }

    let expected_progress = (actual / estimated * 100.0).min(100.0);
    let efficiency = f64::from(task.progress) / expected_progress.max(1.0);
    (efficiency * 100.0).clamp(0.0, 100.0)
}

/// Penalties for update gaps, a zero-progress start, and stalled history.
fn score_blockage_risk(task: &Task, events: &[EventRecord], now: DateTime<Utc>) -> f64 {
    let mut risk: f64 = 100.0;

    let since_update = task.hours_since_update(now);
    if since_update > 24.0 {
        risk -= 20.0;
    }
    if since_update > 72.0 {
        risk -= 30.0;
    }

    if task.status == TaskStatus::InProgress && task.progress == 0 && task.age_hours(now) > 4.0 {
        risk -= 25.0;
    }

    if progress_stalled(events) {
        risk -= 30.0;
    }

    risk.max(0.0)
}

/// Whether the recorded progress history has flatlined: at least four
/// progress-bearing events with the last five all reporting one value.
fn progress_stalled(events: &[EventRecord]) -> bool {
    let values: Vec<u64> = events.iter().filter_map(|e| e.progress_change()).collect();
    if values.len() <= 3 {
        return false;
    }
    let recent = &values[values.len().saturating_sub(5)..];
    recent.windows(2).all(|w| w[0] == w[1])
}

/// Events per 24 h against an expected floor of one per 24 h.
fn score_communication(task: &Task, events: &[EventRecord], now: DateTime<Utc>) -> f64 {
    let age = task.age_hours(now).max(1.0);
    let expected = (age / 24.0).floor().max(1.0);
    let ratio = events.len() as f64 / expected;
    (ratio * 100.0).min(100.0)
}

/// Penalties for missing test/doc evidence late in a task and for
/// error-typed events in its history.
fn score_quality(task: &Task, events: &[EventRecord]) -> f64 {
    let mut quality = 100.0;

    if !files_match(task, TEST_PATTERNS) && task.progress > 50 {
        quality -= 25.0;
    }
    if !files_match(task, DOC_PATTERNS) && task.progress > 75 {
        quality -= 15.0;
    }

    let errors = events
        .iter()
        .filter(|e| e.operation == EventKind::Error)
        .count();
    quality -= errors as f64 * 10.0;

    quality.max(0.0)
}

fn files_match(task: &Task, patterns: &[&str]) -> bool {
    task.implementation_notes
        .files_created
        .iter()
        .chain(task.implementation_notes.files_modified.iter())
        .any(|file| {
            let lower = file.to_lowercase();
            patterns.iter().any(|p| lower.contains(p))
        })
}

// ============================================================================
// Recommendations
// ============================================================================

fn recommendations(scores: &FactorScores) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if scores.progress_velocity < 50.0 {
        out.push(Recommendation {
            kind: RecommendationKind::Velocity,
            priority: Severity::High,
            message: "Task progress is slower than expected".to_string(),
            action: "Consider breaking down into smaller subtasks or getting help".to_string(),
        });
    }
    if scores.implementation < 30.0 {
        out.push(Recommendation {
            kind: RecommendationKind::Implementation,
            priority: Severity::Critical,
            message: "No implementation evidence found".to_string(),
            action: "Start creating the required files or update implementation notes".to_string(),
        });
    }
    if scores.dependencies < 50.0 {
        out.push(Recommendation {
            kind: RecommendationKind::Dependencies,
            priority: Severity::High,
            message: "Blocked by incomplete dependencies".to_string(),
            action: "Review and prioritize blocking tasks".to_string(),
        });
    }
    if scores.communication < 50.0 {
        out.push(Recommendation {
            kind: RecommendationKind::Communication,
            priority: Severity::Medium,
            message: "Insufficient status updates".to_string(),
            action: "Provide regular progress updates to maintain visibility".to_string(),
        });
    }

    out
}

// ============================================================================
// Tests
// ============================================================================
