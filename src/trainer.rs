use serde::Serialize;

use crate::models::TrainingExample;
use crate::scaler::{self, ScalingParams};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub iterations: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            iterations: 2500,
        }
    }
}

/// Trained weights plus the scaling that produced their inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearModel {
    /// Bias first, then one weight per feature.
    pub weights: [f64; 4],
    pub means: [f64; 3],
    pub std_devs: [f64; 3],
}

impl LinearModel {
    pub fn predict(&self, features: [f64; 3]) -> f64 {
        let scaled = features
            .iter()
            .zip(self.means.iter().zip(self.std_devs.iter()))
            .map(|(value, (mean, std_dev))| (value - mean) / std_dev);
        self.weights[0]
            + self.weights[1..]
                .iter()
                .zip(scaled)
                .map(|(weight, value)| weight * value)
                .sum::<f64>()
    }
}

/// Full-batch gradient descent on mean squared error.
///
/// Runs exactly `config.iterations` synchronous updates starting from
/// all-zero weights; there is no convergence check. `rows` must not be empty.
pub fn gradient_descent(rows: &[Vec<f64>], labels: &[f64], config: TrainerConfig) -> Vec<f64> {
    let features = rows.first().map(Vec::len).unwrap_or(0);
    let count = rows.len() as f64;
    let mut weights = vec![0.0; features + 1];

    for _ in 0..config.iterations {
        let mut gradients = vec![0.0; features + 1];
        for (row, label) in rows.iter().zip(labels) {
            let error = predict_scaled(&weights, row) - label;
            gradients[0] += error;
            for (gradient, value) in gradients[1..].iter_mut().zip(row) {
                *gradient += error * value;
            }
        }

        let step = config.learning_rate / count;
        for (weight, gradient) in weights.iter_mut().zip(&gradients) {
            *weight -= step * gradient;
        }
    }

    weights
}

fn predict_scaled(weights: &[f64], row: &[f64]) -> f64 {
    weights[0]
        + weights[1..]
            .iter()
            .zip(row)
            .map(|(weight, value)| weight * value)
            .sum::<f64>()
}

/// Standardizes the examples and fits a model. Returns `None` for an
/// empty training set.
pub fn fit(examples: &[TrainingExample], config: TrainerConfig) -> Option<LinearModel> {
    if examples.is_empty() {
        return None;
    }

    let rows: Vec<Vec<f64>> = examples.iter().map(|ex| ex.features.to_vec()).collect();
    let labels: Vec<f64> = examples.iter().map(|ex| ex.label).collect();
    let (scaled, ScalingParams { means, std_devs }) = scaler::standardize(&rows);
    let weights = gradient_descent(&scaled, &labels, config);

    Some(LinearModel {
        weights: [weights[0], weights[1], weights[2], weights[3]],
        means: [means[0], means[1], means[2]],
        std_devs: [std_devs[0], std_devs[1], std_devs[2]],
    })
}
