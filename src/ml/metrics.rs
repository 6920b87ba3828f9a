//! Evaluation metrics shared by the forecasting and classification engines.

use serde::{Deserialize, Serialize};

const MAPE_EPSILON: f64 = 1e-8;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than 2 values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Population standard deviation (n denominator).
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / values.len() as f64).sqrt()
}

/// Min-max normalize into [0, 1]. Zero-variance input maps every value to
/// the neutral 0.5 rather than dividing by zero.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if values.is_empty() || range <= 0.0 {
        return vec![0.5; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Held-out regression metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    /// Mean absolute percentage error, with an epsilon guard on the
    /// denominator.
    pub mape: f64,
}

pub fn regression_metrics(actual: &[f64], predicted: &[f64]) -> RegressionMetrics {
    let n = actual.len().max(1) as f64;
    let mae = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n;
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n;
    let mean_actual = mean(actual);
    let ss_tot: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
    let mape = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| ((a - p) / (a + MAPE_EPSILON)).abs())
        .sum::<f64>()
        / n
        * 100.0;

    RegressionMetrics {
        mae,
        rmse: mse.sqrt(),
        r2,
        mape,
    }
}

/// Per-class precision/recall/F1 with support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassReport {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// Held-out binary classification metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub auc_roc: f64,
    /// `[[tn, fp], [fn, tp]]`.
    pub confusion_matrix: [[u64; 2]; 2],
    pub on_time_class: ClassReport,
    pub late_class: ClassReport,
}

fn precision_recall_f1(tp: u64, fp: u64, fn_: u64) -> (f64, f64, f64) {
    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if tp + fn_ > 0 {
        tp as f64 / (tp + fn_) as f64
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

pub fn classification_metrics(
    actual: &[u8],
    predicted: &[u8],
    probabilities: &[f64],
) -> ClassificationMetrics {
    let mut tn = 0u64;
    let mut fp = 0u64;
    let mut fn_ = 0u64;
    let mut tp = 0u64;
    for (&a, &p) in actual.iter().zip(predicted) {
        match (a, p) {
            (0, 0) => tn += 1,
            (0, _) => fp += 1,
            (_, 0) => fn_ += 1,
            _ => tp += 1,
        }
    }

    let total = (tn + fp + fn_ + tp).max(1);
    let accuracy = (tn + tp) as f64 / total as f64;
    let (precision, recall, f1) = precision_recall_f1(tp, fp, fn_);
    // Class 0 report: positives are the on-time orders.
    let (p0, r0, f0) = precision_recall_f1(tn, fn_, fp);

    ClassificationMetrics {
        accuracy,
        precision,
        recall,
        f1,
        auc_roc: auc_roc(actual, probabilities),
        confusion_matrix: [[tn, fp], [fn_, tp]],
        on_time_class: ClassReport {
            precision: p0,
            recall: r0,
            f1: f0,
            support: tn + fp,
        },
        late_class: ClassReport {
            precision,
            recall,
            f1,
            support: fn_ + tp,
        },
    }
}

/// Rank-based AUC-ROC (Mann-Whitney U with average ranks for ties).
pub fn auc_roc(actual: &[u8], probabilities: &[f64]) -> f64 {
    let n_pos = actual.iter().filter(|&&a| a == 1).count();
    let n_neg = actual.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..actual.len()).collect();
    order.sort_by(|&a, &b| probabilities[a].total_cmp(&probabilities[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len()
            && probabilities[order[j + 1]] == probabilities[order[i]]
        {
            j += 1;
        }
        // ranks are 1-based; ties share the average rank
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            if actual[idx] == 1 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let u = rank_sum_pos - (n_pos * (n_pos + 1)) as f64 / 2.0;
    u / (n_pos * n_neg) as f64
}
