//! Training health validation.
//!
//! Keeps a rolling window of recent cycle metrics, smooths them, and
//! classifies numerical issues (exploding/vanishing gradients, policy
//! collapse, value overestimation, degenerate games). Repeated issues are
//! aggregated per identifier with counts and first/last-seen timestamps so
//! a sick run does not flood the log.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Cycles in the smoothing window.
pub const VALIDATION_WINDOW: usize = 10;

/// Per-cycle aggregate fed to the validator and the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub cycle: u64,
    pub loss: f64,
    pub gradient_norm: f64,
    pub policy_entropy: f64,
    pub avg_q: f64,
    pub avg_game_length: f64,
    pub avg_reward: f64,
    pub draw_rate: f64,
    pub step_limit_rate: f64,
    pub unique_actions: usize,
    pub exploration_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrainingIssue {
    ExplodingGradients,
    VanishingGradients,
    PolicyCollapse,
    ValueOverestimation,
    ExplorationInsufficient,
    GamesTooShort,
    StepLimitDominates,
    LowMoveDiversity,
}

impl TrainingIssue {
    pub fn identifier(self) -> &'static str {
        match self {
            TrainingIssue::ExplodingGradients => "EXPLODING_GRADIENTS",
            TrainingIssue::VanishingGradients => "VANISHING_GRADIENTS",
            TrainingIssue::PolicyCollapse => "POLICY_COLLAPSE",
            TrainingIssue::ValueOverestimation => "VALUE_OVERESTIMATION",
            TrainingIssue::ExplorationInsufficient => "EXPLORATION_INSUFFICIENT",
            TrainingIssue::GamesTooShort => "GAMES_TOO_SHORT",
            TrainingIssue::StepLimitDominates => "STEP_LIMIT_DOMINATES",
            TrainingIssue::LowMoveDiversity => "LOW_MOVE_DIVERSITY",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            TrainingIssue::ExplodingGradients => Severity::High,
            TrainingIssue::VanishingGradients => Severity::Medium,
            TrainingIssue::PolicyCollapse => Severity::High,
            TrainingIssue::ValueOverestimation => Severity::Medium,
            TrainingIssue::ExplorationInsufficient => Severity::Medium,
            TrainingIssue::GamesTooShort => Severity::Low,
            TrainingIssue::StepLimitDominates => Severity::Medium,
            TrainingIssue::LowMoveDiversity => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueReport {
    pub issue: TrainingIssue,
    pub severity: Severity,
    pub message: String,
}

/// One aggregated entry per issue identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedIssue {
    pub identifier: String,
    pub severity: Severity,
    pub count: u64,
    pub first_seen: String,
    pub last_seen: String,
    pub last_message: String,
}

#[derive(Debug, Default, Clone)]
struct RollingWindow {
    values: VecDeque<f64>,
}

impl RollingWindow {
    fn push(&mut self, value: f64) {
        if self.values.len() == VALIDATION_WINDOW {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    /// Mean of the second half minus mean of the first half; a crude trend.
    fn trend(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return 0.0;
        }
        let half = n / 2;
        let first: f64 = self.values.iter().take(half).sum::<f64>() / half as f64;
        let second: f64 =
            self.values.iter().skip(n - half).sum::<f64>() / half as f64;
        second - first
    }
}

/// Smoothed values for the current cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothedMetrics {
    pub loss: f64,
    pub gradient_norm: f64,
    pub policy_entropy: f64,
    pub avg_q: f64,
    pub avg_game_length: f64,
    pub draw_rate: f64,
    pub step_limit_rate: f64,
}

pub struct TrainingValidator {
    loss: RollingWindow,
    gradient_norm: RollingWindow,
    entropy: RollingWindow,
    avg_q: RollingWindow,
    game_length: RollingWindow,
    reward: RollingWindow,
    draw_rate: RollingWindow,
    step_limit_rate: RollingWindow,
    unique_actions: RollingWindow,
    min_unique_actions: usize,
    aggregated: HashMap<&'static str, AggregatedIssue>,
}

impl TrainingValidator {
    pub fn new(min_unique_actions: usize) -> TrainingValidator {
        TrainingValidator {
            loss: RollingWindow::default(),
            gradient_norm: RollingWindow::default(),
            entropy: RollingWindow::default(),
            avg_q: RollingWindow::default(),
            game_length: RollingWindow::default(),
            reward: RollingWindow::default(),
            draw_rate: RollingWindow::default(),
            step_limit_rate: RollingWindow::default(),
            unique_actions: RollingWindow::default(),
            min_unique_actions,
            aggregated: HashMap::new(),
        }
    }

    pub fn smoothed(&self) -> SmoothedMetrics {
        SmoothedMetrics {
            loss: self.loss.mean(),
            gradient_norm: self.gradient_norm.mean(),
            policy_entropy: self.entropy.mean(),
            avg_q: self.avg_q.mean(),
            avg_game_length: self.game_length.mean(),
            draw_rate: self.draw_rate.mean(),
            step_limit_rate: self.step_limit_rate.mean(),
        }
    }

    /// Ingest one cycle's metrics and classify issues on the smoothed
    /// window.
    pub fn observe(&mut self, metrics: &CycleMetrics) -> Vec<IssueReport> {
        self.loss.push(metrics.loss);
        self.gradient_norm.push(metrics.gradient_norm);
        self.entropy.push(metrics.policy_entropy);
        self.avg_q.push(metrics.avg_q);
        self.game_length.push(metrics.avg_game_length);
        self.reward.push(metrics.avg_reward);
        self.draw_rate.push(metrics.draw_rate);
        self.step_limit_rate.push(metrics.step_limit_rate);
        self.unique_actions.push(metrics.unique_actions as f64);

        let mut issues = Vec::new();
        let smoothed_grad = self.gradient_norm.mean();
        if smoothed_grad > 10.0 {
            issues.push((
                TrainingIssue::ExplodingGradients,
                format!("smoothed gradient norm {:.3} > 10", smoothed_grad),
            ));
        } else if smoothed_grad < 1e-6 && self.gradient_norm.len() == VALIDATION_WINDOW {
            issues.push((
                TrainingIssue::VanishingGradients,
                format!("smoothed gradient norm {:.3e} < 1e-6", smoothed_grad),
            ));
        }

        let smoothed_entropy = self.entropy.mean();
        if smoothed_entropy < 0.1 && self.entropy.len() == VALIDATION_WINDOW {
            issues.push((
                TrainingIssue::PolicyCollapse,
                format!("smoothed policy entropy {:.4} nats < 0.1", smoothed_entropy),
            ));
        }

        let smoothed_q = self.avg_q.mean();
        if smoothed_q > 100.0 {
            issues.push((
                TrainingIssue::ValueOverestimation,
                format!("smoothed mean Q {:.1} > 100", smoothed_q),
            ));
        }

        if metrics.exploration_rate < 0.01
            && self.reward.len() == VALIDATION_WINDOW
            && self.reward.trend() <= 0.0
        {
            issues.push((
                TrainingIssue::ExplorationInsufficient,
                format!(
                    "epsilon {:.4} with non-positive reward trend over {} cycles",
                    metrics.exploration_rate,
                    self.reward.len()
                ),
            ));
        }

        if self.game_length.len() == VALIDATION_WINDOW && self.game_length.mean() < 10.0 {
            issues.push((
                TrainingIssue::GamesTooShort,
                format!("mean game length {:.1} plies < 10", self.game_length.mean()),
            ));
        }

        if self.step_limit_rate.mean() > 0.5 {
            issues.push((
                TrainingIssue::StepLimitDominates,
                format!(
                    "{:.0}% of games hit the step limit",
                    self.step_limit_rate.mean() * 100.0
                ),
            ));
        }

        if self.unique_actions.len() == VALIDATION_WINDOW
            && self.unique_actions.mean() < self.min_unique_actions as f64
        {
            issues.push((
                TrainingIssue::LowMoveDiversity,
                format!(
                    "{:.0} unique actions over the window < {}",
                    self.unique_actions.mean(),
                    self.min_unique_actions
                ),
            ));
        }

        let now = chrono::Utc::now().to_rfc3339();
        issues
            .into_iter()
            .map(|(issue, message)| {
                let entry = self
                    .aggregated
                    .entry(issue.identifier())
                    .or_insert_with(|| AggregatedIssue {
                        identifier: issue.identifier().to_string(),
                        severity: issue.severity(),
                        count: 0,
                        first_seen: now.clone(),
                        last_seen: now.clone(),
                        last_message: String::new(),
                    });
                entry.count += 1;
                entry.last_seen = now.clone();
                entry.last_message = message.clone();
                IssueReport {
                    issue,
                    severity: issue.severity(),
                    message,
                }
            })
            .collect()
    }

    /// Deduplicated issue history, highest severity first.
    pub fn aggregated(&self) -> Vec<AggregatedIssue> {
        let mut entries: Vec<AggregatedIssue> = self.aggregated.values().cloned().collect();
        entries.sort_by(|a, b| b.severity.cmp(&a.severity).then(b.count.cmp(&a.count)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(cycle: u64) -> CycleMetrics {
        CycleMetrics {
            cycle,
            loss: 0.5,
            gradient_norm: 1.0,
            policy_entropy: 2.0,
            avg_q: 1.0,
            avg_game_length: 60.0,
            avg_reward: 0.1,
            draw_rate: 0.3,
            step_limit_rate: 0.1,
            unique_actions: 300,
            exploration_rate: 0.1,
        }
    }

    #[test]
    fn test_healthy_metrics_raise_nothing() {
        let mut validator = TrainingValidator::new(50);
        for cycle in 0..20 {
            assert!(validator.observe(&metrics(cycle)).is_empty());
        }
    }

    #[test]
    fn test_exploding_gradients_detected() {
        let mut validator = TrainingValidator::new(50);
        let mut m = metrics(0);
        m.gradient_norm = 500.0;
        let issues = validator.observe(&m);
        assert!(issues
            .iter()
            .any(|i| i.issue == TrainingIssue::ExplodingGradients));
        assert_eq!(issues[0].severity, Severity::High);
    }

    #[test]
    fn test_policy_collapse_needs_full_window() {
        let mut validator = TrainingValidator::new(50);
        let mut m = metrics(0);
        m.policy_entropy = 0.01;
        for cycle in 0..VALIDATION_WINDOW as u64 - 1 {
            m.cycle = cycle;
            let issues = validator.observe(&m);
            assert!(!issues.iter().any(|i| i.issue == TrainingIssue::PolicyCollapse));
        }
        let issues = validator.observe(&m);
        assert!(issues.iter().any(|i| i.issue == TrainingIssue::PolicyCollapse));
    }

    #[test]
    fn test_step_limit_domination_detected() {
        let mut validator = TrainingValidator::new(50);
        let mut m = metrics(0);
        m.step_limit_rate = 0.9;
        let issues = validator.observe(&m);
        assert!(issues
            .iter()
            .any(|i| i.issue == TrainingIssue::StepLimitDominates));
    }

    #[test]
    fn test_exploration_insufficient_requires_flat_reward() {
        let mut validator = TrainingValidator::new(50);
        // Rising rewards: low epsilon alone is not an issue.
        for cycle in 0..VALIDATION_WINDOW as u64 {
            let mut m = metrics(cycle);
            m.exploration_rate = 0.001;
            m.avg_reward = cycle as f64 * 0.1;
            let issues = validator.observe(&m);
            assert!(
                !issues
                    .iter()
                    .any(|i| i.issue == TrainingIssue::ExplorationInsufficient),
                "cycle {}",
                cycle
            );
        }
        // Decaying rewards with exhausted epsilon is.
        let mut validator = TrainingValidator::new(50);
        for cycle in 0..VALIDATION_WINDOW as u64 {
            let mut m = metrics(cycle);
            m.exploration_rate = 0.001;
            m.avg_reward = -(cycle as f64) * 0.1;
            validator.observe(&m);
        }
        let mut m = metrics(99);
        m.exploration_rate = 0.001;
        m.avg_reward = -2.0;
        let issues = validator.observe(&m);
        assert!(issues
            .iter()
            .any(|i| i.issue == TrainingIssue::ExplorationInsufficient));
    }

    #[test]
    fn test_aggregation_counts_repeats() {
        let mut validator = TrainingValidator::new(50);
        let mut m = metrics(0);
        m.gradient_norm = 1e9;
        for cycle in 0..5 {
            m.cycle = cycle;
            validator.observe(&m);
        }
        let aggregated = validator.aggregated();
        assert_eq!(aggregated.len(), 1);
        assert_eq!(aggregated[0].identifier, "EXPLODING_GRADIENTS");
        assert_eq!(aggregated[0].count, 5);
    }
}
