//! Shadow evaluation: run a challenger predictor alongside the champion
//! without affecting the live decision, then decide whether to promote it.

use chrono::{DateTime, Utc};

/// One paired observation: what the champion and challenger each predicted,
/// and what was actually observed once the plan ran.
#[derive(Debug, Clone, Copy)]
pub struct ShadowObservation {
    pub champion_prediction: f64,
    pub challenger_prediction: f64,
    pub actual: f64,
    pub observed_at: DateTime<Utc>,
}

/// Promotion thresholds.
#[derive(Debug, Clone, Copy)]
pub struct PromotionCriteria {
    pub min_samples: usize,
    pub min_days: i64,
    /// Minimum *relative* MAE reduction `(prodMAE - shadowMAE) / prodMAE`
    /// the challenger must show over the champion to be promoted.
    pub min_improvement: f64,
}

impl Default for PromotionCriteria {
    fn default() -> Self {
        Self { min_samples: 100, min_days: 3, min_improvement: 0.05 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromotionDecision {
    pub should_promote: bool,
    pub champion_mae: f64,
    pub challenger_mae: f64,
    pub reason: String,
}

pub struct ShadowComparator;

impl ShadowComparator {
    pub fn mean_absolute_error(observations: &[ShadowObservation], pick: impl Fn(&ShadowObservation) -> f64) -> f64 {
        if observations.is_empty() {
            return 0.0;
        }
        let total: f64 = observations.iter().map(|o| (pick(o) - o.actual).abs()).sum();
        total / observations.len() as f64
    }

    /// Decide whether the challenger should replace the champion: `promote` iff `(prodMAE - shadowMAE)/prodMAE >= min_improvement`,
    /// the observation window spans at least `min_days`, and the labeled
    /// sample count is at least `min_samples`. Otherwise `keep_observing`
    /// (insufficient samples/window) or `no_action` (samples and window are
    /// sufficient but the challenger isn't better enough).
    pub fn evaluate(observations: &[ShadowObservation], criteria: PromotionCriteria) -> PromotionDecision {
        let champion_mae = Self::mean_absolute_error(observations, |o| o.champion_prediction);
        let challenger_mae = Self::mean_absolute_error(observations, |o| o.challenger_prediction);

        if observations.len() < criteria.min_samples {
            return PromotionDecision {
                should_promote: false,
                champion_mae,
                challenger_mae,
                reason: format!("keep_observing: insufficient samples ({} < {})", observations.len(), criteria.min_samples),
            };
        }

        let window_days = match (observations.iter().map(|o| o.observed_at).min(), observations.iter().map(|o| o.observed_at).max()) {
            (Some(earliest), Some(latest)) => (latest - earliest).num_days(),
            _ => 0,
        };
        if window_days < criteria.min_days {
            return PromotionDecision {
                should_promote: false,
                champion_mae,
                challenger_mae,
                reason: format!("keep_observing: observation window too short ({window_days}d < {}d)", criteria.min_days),
            };
        }

        if champion_mae <= 0.0 {
            return PromotionDecision {
                should_promote: false,
                champion_mae,
                challenger_mae,
                reason: "no_action: champion MAE is zero, relative improvement undefined".to_string(),
            };
        }

        let relative_improvement = (champion_mae - challenger_mae) / champion_mae;
        if relative_improvement < criteria.min_improvement {
            return PromotionDecision {
                should_promote: false,
                champion_mae,
                challenger_mae,
                reason: format!(
                    "no_action: relative improvement {relative_improvement:.3} below threshold {:.3}",
                    criteria.min_improvement
                ),
            };
        }

        PromotionDecision {
            should_promote: true,
            champion_mae,
            challenger_mae,
            reason: format!("promote: challenger MAE {challenger_mae:.2} beats champion {champion_mae:.2} by {relative_improvement:.1%}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(champion: f64, challenger: f64, actual: f64, days_ago: i64) -> ShadowObservation {
        ShadowObservation { champion_prediction: champion, challenger_prediction: challenger, actual, observed_at: Utc::now() - chrono::Duration::days(days_ago) }
    }

    fn criteria() -> PromotionCriteria {
        PromotionCriteria { min_samples: 3, min_days: 5, min_improvement: 0.1 }
    }

    #[test]
    fn promotes_when_challenger_clearly_better_over_long_window() {
        let observations = vec![
            observation(20.0, 10.0, 10.0, 10),
            observation(25.0, 11.0, 10.0, 5),
            observation(22.0, 9.0, 10.0, 0),
        ];
        let decision = ShadowComparator::evaluate(&observations, criteria());
        assert!(decision.should_promote);
    }

    #[test]
    fn withholds_promotion_under_min_sample_count() {
        let observations = vec![observation(20.0, 10.0, 10.0, 10), observation(25.0, 11.0, 10.0, 5)];
        let decision = ShadowComparator::evaluate(&observations, criteria());
        assert!(!decision.should_promote);
        assert!(decision.reason.contains("insufficient samples"));
    }

    #[test]
    fn withholds_promotion_under_short_observation_window() {
        let observations = vec![observation(20.0, 10.0, 10.0, 1), observation(25.0, 11.0, 10.0, 1), observation(22.0, 9.0, 10.0, 0)];
        let decision = ShadowComparator::evaluate(&observations, criteria());
        assert!(!decision.should_promote);
        assert!(decision.reason.contains("window too short"));
    }

    #[test]
    fn withholds_promotion_when_improvement_below_threshold() {
        let observations = vec![
            observation(20.0, 19.5, 10.0, 10),
            observation(25.0, 24.5, 10.0, 5),
            observation(22.0, 21.5, 10.0, 0),
        ];
        let decision = ShadowComparator::evaluate(&observations, criteria());
        assert!(!decision.should_promote);
        assert!(decision.reason.contains("below threshold"));
    }

    #[test]
    fn default_criteria_match_shadow_defaults() {
        let defaults = PromotionCriteria::default();
        assert_eq!(defaults.min_samples, 100);
        assert_eq!(defaults.min_days, 3);
        assert!((defaults.min_improvement - 0.05).abs() < 1e-9);
    }

    #[test]
    fn mae_of_empty_observations_is_zero() {
        assert_eq!(ShadowComparator::mean_absolute_error(&[], |o| o.champion_prediction), 0.0);
    }
}
