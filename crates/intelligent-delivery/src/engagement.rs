//! Engagement predictor — probability that a notification is opened, given
//! its personalization score and the hour and weekday it is sent.
//!
//! A logistic model fitted by batch gradient descent over standardized
//! features. Hour and weekday are encoded on the unit circle so 23:00 sits
//! next to 00:00 and Saturday next to Sunday.

use chrono::{Datelike, Timelike};
use ndarray::{aview1, Array1, Array2, ArrayView1, Axis};
use notify_core::config::EngagementConfig;
use notify_core::types::NotificationEvent;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::{info, warn};

const FEATURES: usize = 5;
/// Every fifth sample is held out for accuracy reporting.
const HOLDOUT_STRIDE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementSample {
    pub personalization_score: f64,
    pub hour: u32,
    /// 0 = Sunday.
    pub weekday: u32,
    pub opened: bool,
}

impl EngagementSample {
    pub fn from_event(event: &NotificationEvent) -> Self {
        Self {
            personalization_score: event.personalization_score,
            hour: event.sent_at.hour(),
            weekday: event.sent_at.weekday().num_days_from_sunday(),
            opened: event.opened(),
        }
    }

    fn features(&self) -> [f64; FEATURES] {
        raw_features(self.personalization_score, self.hour, self.weekday)
    }

    fn label(&self) -> f64 {
        if self.opened {
            1.0
        } else {
            0.0
        }
    }
}

fn raw_features(score: f64, hour: u32, weekday: u32) -> [f64; FEATURES] {
    let h = TAU * f64::from(hour % 24) / 24.0;
    let d = TAU * f64::from(weekday % 7) / 7.0;
    [score, h.sin(), h.cos(), d.sin(), d.cos()]
}

/// Samples × features design matrix and the matching label vector.
fn design_matrix(samples: &[&EngagementSample]) -> (Array2<f64>, Array1<f64>) {
    let rows: Vec<[f64; FEATURES]> = samples.iter().map(|s| s.features()).collect();
    let x = Array2::from_shape_fn((rows.len(), FEATURES), |(i, j)| rows[i][j]);
    let y = samples.iter().map(|s| s.label()).collect();
    (x, y)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone)]
struct LogisticModel {
    mean: Array1<f64>,
    /// Per-feature standard deviation; 1.0 for constant columns.
    scale: Array1<f64>,
    weights: Array1<f64>,
    bias: f64,
}

impl LogisticModel {
    fn fit(x: &Array2<f64>, y: &Array1<f64>, learning_rate: f64, epochs: usize) -> Self {
        let n = x.nrows().max(1) as f64;
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let centered = x - &mean;
        let scale = centered
            .mapv(|v| v * v)
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::ones(x.ncols()))
            .mapv(|var| if var > 1e-12 { var.sqrt() } else { 1.0 });
        let z = &centered / &scale;

        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        for _ in 0..epochs {
            let predicted = (z.dot(&weights) + bias).mapv(sigmoid);
            let err = &predicted - y;
            let grad_w = z.t().dot(&err) / n;
            let grad_b = err.sum() / n;
            weights.scaled_add(-learning_rate, &grad_w);
            bias -= learning_rate * grad_b;
        }

        Self {
            mean,
            scale,
            weights,
            bias,
        }
    }

    fn probability(&self, x: ArrayView1<f64>) -> f64 {
        let z = (&x - &self.mean) / &self.scale;
        sigmoid(z.dot(&self.weights) + self.bias)
    }

    fn probabilities(&self, x: &Array2<f64>) -> Array1<f64> {
        let z = (x - &self.mean) / &self.scale;
        (z.dot(&self.weights) + self.bias).mapv(sigmoid)
    }
}

#[derive(Debug, Clone)]
pub struct EngagementPredictor {
    model: Option<LogisticModel>,
    default_probability: f64,
    training_samples: usize,
    holdout_accuracy: Option<f64>,
}

impl EngagementPredictor {
    pub fn untrained(default_probability: f64) -> Self {
        Self {
            model: None,
            default_probability,
            training_samples: 0,
            holdout_accuracy: None,
        }
    }

    /// Fit on `samples`. Fewer than `min_training_samples` leaves the
    /// predictor untrained.
    pub fn train(samples: &[EngagementSample], config: &EngagementConfig) -> Self {
        if samples.len() < config.min_training_samples {
            warn!(
                samples = samples.len(),
                required = config.min_training_samples,
                "Insufficient history for engagement model training"
            );
            return Self::untrained(config.default_probability);
        }

        let (holdout, train): (Vec<_>, Vec<_>) = samples
            .iter()
            .enumerate()
            .partition(|(i, _)| i % HOLDOUT_STRIDE == HOLDOUT_STRIDE - 1);
        let train: Vec<&EngagementSample> = train.into_iter().map(|(_, s)| s).collect();
        let holdout: Vec<&EngagementSample> = holdout.into_iter().map(|(_, s)| s).collect();

        let (x, y) = design_matrix(&train);
        let model = LogisticModel::fit(&x, &y, config.learning_rate, config.epochs);

        let holdout_accuracy = if holdout.is_empty() {
            None
        } else {
            let (x, y) = design_matrix(&holdout);
            let correct = model
                .probabilities(&x)
                .iter()
                .zip(y.iter())
                .filter(|(p, y)| (**p >= 0.5) == (**y >= 0.5))
                .count();
            Some(correct as f64 / holdout.len() as f64)
        };

        info!(
            train = train.len(),
            holdout = holdout.len(),
            accuracy = holdout_accuracy.unwrap_or(f64::NAN),
            "Trained engagement prediction model"
        );

        Self {
            model: Some(model),
            default_probability: config.default_probability,
            training_samples: train.len(),
            holdout_accuracy,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn training_samples(&self) -> usize {
        self.training_samples
    }

    pub fn holdout_accuracy(&self) -> Option<f64> {
        self.holdout_accuracy
    }

    /// Open probability in [0, 1]; the default probability when untrained.
    pub fn predict(&self, personalization_score: f64, hour: u32, weekday: u32) -> f64 {
        match &self.model {
            Some(model) => {
                let features = raw_features(personalization_score, hour, weekday);
                model.probability(aview1(&features)).clamp(0.0, 1.0)
            }
            None => self.default_probability,
        }
    }
}

impl Default for EngagementPredictor {
    fn default() -> Self {
        Self::untrained(EngagementConfig::default().default_probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(score: f64, hour: u32, opened: bool) -> EngagementSample {
        EngagementSample {
            personalization_score: score,
            hour,
            weekday: 2,
            opened,
        }
    }

    #[test]
    fn test_untrained_returns_default() {
        let predictor = EngagementPredictor::default();
        assert!(!predictor.is_trained());
        assert_eq!(predictor.predict(0.9, 10, 1), 0.5);
    }

    #[test]
    fn test_too_few_samples_stays_untrained() {
        let samples: Vec<_> = (0..9).map(|i| sample(0.5, i, i % 2 == 0)).collect();
        let predictor = EngagementPredictor::train(&samples, &EngagementConfig::default());
        assert!(!predictor.is_trained());
        assert_eq!(predictor.predict(0.9, 10, 1), 0.5);
    }

    #[test]
    fn test_learns_score_signal() {
        let samples: Vec<_> = (0..100)
            .map(|i| {
                let high = i % 2 == 0;
                sample(if high { 0.9 } else { 0.2 }, (i % 24) as u32, high)
            })
            .collect();
        let predictor = EngagementPredictor::train(&samples, &EngagementConfig::default());
        assert!(predictor.is_trained());
        assert_eq!(predictor.training_samples(), 80);
        let high = predictor.predict(0.9, 12, 2);
        let low = predictor.predict(0.2, 12, 2);
        assert!(high > 0.5 && low < 0.5, "high={high} low={low}");
        assert_eq!(predictor.holdout_accuracy(), Some(1.0));
    }

    #[test]
    fn test_design_matrix_layout() {
        let samples = [sample(0.4, 6, true), sample(0.8, 18, false)];
        let refs: Vec<&EngagementSample> = samples.iter().collect();
        let (x, y) = design_matrix(&refs);
        assert_eq!(x.dim(), (2, FEATURES));
        assert_eq!(x[[1, 0]], 0.8);
        // 06:00 is a quarter turn around the clock.
        assert!((x[[0, 1]] - 1.0).abs() < 1e-12);
        assert!(x[[0, 2]].abs() < 1e-12);
        assert_eq!(y.to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_constant_columns_do_not_poison_the_fit() {
        // Weekday never varies, so its columns have zero variance.
        let samples: Vec<_> = (0..40)
            .map(|i| sample(if i % 2 == 0 { 0.9 } else { 0.1 }, 9, i % 2 == 0))
            .collect();
        let refs: Vec<&EngagementSample> = samples.iter().collect();
        let (x, y) = design_matrix(&refs);
        let model = LogisticModel::fit(&x, &y, 0.1, 200);
        assert!(model.scale.iter().all(|s| s.is_finite() && *s > 0.0));
        assert!(model.weights.iter().all(|w| w.is_finite()));
        assert!(model.weights[0] > 0.0);
        let probabilities = model.probabilities(&x);
        assert!(probabilities[0] > 0.5 && probabilities[1] < 0.5);
    }

    #[test]
    fn test_predictions_stay_in_unit_interval() {
        let samples: Vec<_> = (0..20).map(|i| sample(0.3, i, true)).collect();
        let predictor = EngagementPredictor::train(&samples, &EngagementConfig::default());
        for hour in 0..24 {
            let p = predictor.predict(5.0, hour, 6);
            assert!((0.0..=1.0).contains(&p));
        }
    }
}
