//! Confidence calibration: how stated confidence relates to realized
//! accuracy.
//!
//! Both measures are computed over the pairs that are actually comparable:
//! predictions with a resolved correctness AND a stated confidence. With no
//! such pairs the measures are unresolved (`None`), never zero.

use crate::domain::prediction::ClassifiedPrediction;
use serde::{Deserialize, Serialize};

/// Display band for the calibration gap magnitude. A reporting convention,
/// not a statistical test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationBand {
    Excellent,
    Good,
    Poor,
}

impl CalibrationBand {
    pub fn from_gap(gap: f64) -> Self {
        let magnitude = gap.abs();
        if magnitude <= 0.1 {
            CalibrationBand::Excellent
        } else if magnitude <= 0.2 {
            CalibrationBand::Good
        } else {
            CalibrationBand::Poor
        }
    }
}

fn scored_pairs(classified: &[ClassifiedPrediction]) -> Vec<(f64, bool)> {
    classified
        .iter()
        .filter_map(|c| match (c.confidence, c.direction_correct) {
            (Some(confidence), Some(correct)) => Some((confidence, correct)),
            _ => None,
        })
        .collect()
}

/// Signed gap between mean stated confidence and realized directional
/// accuracy. Positive means overconfident, negative underconfident.
pub fn confidence_calibration(classified: &[ClassifiedPrediction]) -> Option<f64> {
    let pairs = scored_pairs(classified);
    if pairs.is_empty() {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_confidence = pairs.iter().map(|(c, _)| c).sum::<f64>() / n;
    let accuracy = pairs.iter().filter(|(_, correct)| *correct).count() as f64 / n;
    Some(mean_confidence - accuracy)
}

/// Pearson correlation between stated confidence and correctness (as 0/1).
///
/// Unresolved with fewer than 2 comparable pairs or constant confidence;
/// constant correctness is equally degenerate and also unresolved.
pub fn confidence_accuracy_correlation(classified: &[ClassifiedPrediction]) -> Option<f64> {
    let pairs = scored_pairs(classified);
    let x: Vec<f64> = pairs.iter().map(|(c, _)| *c).collect();
    let y: Vec<f64> = pairs
        .iter()
        .map(|(_, correct)| if *correct { 1.0 } else { 0.0 })
        .collect();
    pearson(&x, &y)
}

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }

    Some((cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0))
}
