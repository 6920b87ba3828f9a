/*!
 * # Late-Delivery Prediction
 *
 * Binary gradient-boosted classifier over categorical and numeric order
 * attributes. Categorical columns are label-encoded once at training time;
 * values never seen in training map to the unseen sentinel instead of
 * failing, which keeps the what-if tool robust to arbitrary agent input.
 */

use crate::dataset::Dataset;
use crate::errors::ServiceError;
use crate::ml::encoder::LabelEncoder;
use crate::ml::gbdt::{GbdtClassifier, GbdtParams};
use crate::ml::metrics::{self, ClassificationMetrics};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

const TEST_FRACTION: f64 = 0.2;

const HIGH_RISK_THRESHOLD: f64 = 0.7;
const MEDIUM_RISK_THRESHOLD: f64 = 0.4;

/// Hypothetical order for what-if risk scoring. Every field is optional;
/// missing values fall back to the unseen sentinel (categoricals) or zero
/// (numerics).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderAttributes {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub shipping_mode: Option<String>,
    #[serde(default)]
    pub customer_segment: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub discount_percent: Option<f64>,
    #[serde(default)]
    pub profit_margin: Option<f64>,
    #[serde(default)]
    pub scheduled_shipping_days: Option<f64>,
    #[serde(default)]
    pub order_month: Option<f64>,
    #[serde(default)]
    pub order_quarter: Option<f64>,
    #[serde(default)]
    pub order_day_of_week: Option<f64>,
}

/// Risk bands over the predicted late probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryRisk {
    High,
    Medium,
    Low,
}

impl DeliveryRisk {
    pub fn from_probability(p_late: f64) -> Self {
        if p_late > HIGH_RISK_THRESHOLD {
            DeliveryRisk::High
        } else if p_late > MEDIUM_RISK_THRESHOLD {
            DeliveryRisk::Medium
        } else {
            DeliveryRisk::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryRisk::High => "High",
            DeliveryRisk::Medium => "Medium",
            DeliveryRisk::Low => "Low",
        }
    }
}

/// Result of scoring a single hypothetical order.
#[derive(Debug, Clone, Serialize)]
pub struct SinglePrediction {
    pub prediction: u8,
    pub late_probability: f64,
    pub on_time_probability: f64,
    pub risk_level: DeliveryRisk,
}

/// Training outcome with the held-out labels, predictions, and scores.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryTraining {
    pub metrics: ClassificationMetrics,
    pub actuals: Vec<u8>,
    pub predictions: Vec<u8>,
    pub probabilities: Vec<f64>,
}

#[derive(Debug)]
struct FittedDelivery {
    model: GbdtClassifier,
    feature_names: Vec<String>,
    encoders: HashMap<String, LabelEncoder>,
}

/// Late-delivery classification engine. Holds at most one trained model;
/// retraining replaces it.
pub struct DeliveryPredictor {
    params: GbdtParams,
    fitted: RwLock<Option<Arc<FittedDelivery>>>,
}

impl DeliveryPredictor {
    pub fn new() -> Self {
        Self::with_params(GbdtParams::default())
    }

    pub fn with_params(params: GbdtParams) -> Self {
        Self {
            params,
            fitted: RwLock::new(None),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.fitted.read().map(|g| g.is_some()).unwrap_or(false)
    }

    fn fitted(&self) -> Option<Arc<FittedDelivery>> {
        self.fitted.read().ok().and_then(|g| g.as_ref().cloned())
    }

    /// Train on the full dataset with a stratified 80/20 split and
    /// `scale_pos_weight` covering the late/on-time imbalance.
    pub fn train(&self, dataset: &Dataset) -> Result<DeliveryTraining, ServiceError> {
        if dataset.is_empty() {
            return Err(ServiceError::InsufficientData(
                "dataset has no orders".to_string(),
            ));
        }

        let caps = dataset.capabilities();
        let mut encoders: HashMap<String, LabelEncoder> = HashMap::new();
        encoders.insert(
            "product_category".to_string(),
            LabelEncoder::fit(dataset.records().iter().map(|r| r.product_category.as_str())),
        );
        encoders.insert(
            "region".to_string(),
            LabelEncoder::fit(dataset.records().iter().map(|r| r.region.as_str())),
        );
        encoders.insert(
            "shipping_mode".to_string(),
            LabelEncoder::fit(dataset.records().iter().map(|r| r.shipping_mode.as_str())),
        );
        encoders.insert(
            "customer_segment".to_string(),
            LabelEncoder::fit(dataset.records().iter().map(|r| r.customer_segment.as_str())),
        );
        if caps.has_department {
            encoders.insert(
                "department".to_string(),
                LabelEncoder::fit(
                    dataset
                        .records()
                        .iter()
                        .filter_map(|r| r.department.as_deref()),
                ),
            );
        }

        let feature_names = build_feature_names(&caps, &encoders);

        let mut rows = Vec::with_capacity(dataset.len());
        let mut labels = Vec::with_capacity(dataset.len());
        for r in dataset.records() {
            let mut values: HashMap<&str, f64> = HashMap::new();
            values.insert("unit_price", r.unit_price);
            values.insert("quantity", r.quantity);
            values.insert("revenue", r.revenue);
            values.insert("discount_percent", r.discount_percent);
            if caps.has_profit_margin {
                values.insert("profit_margin", r.profit_margin.unwrap_or(0.0));
            }
            values.insert("scheduled_shipping_days", r.scheduled_shipping_days);
            values.insert("order_month", r.order_month as f64);
            values.insert("order_quarter", r.order_quarter as f64);
            values.insert("order_day_of_week", r.order_day_of_week as f64);
            insert_encoded(&mut values, &encoders, "product_category", Some(&r.product_category));
            insert_encoded(&mut values, &encoders, "region", Some(&r.region));
            insert_encoded(&mut values, &encoders, "shipping_mode", Some(&r.shipping_mode));
            insert_encoded(&mut values, &encoders, "customer_segment", Some(&r.customer_segment));
            insert_encoded(&mut values, &encoders, "department", r.department.as_deref());
            insert_interactions(&mut values);

            rows.push(ordered_row(&feature_names, &values));
            labels.push(u8::from(r.late_delivery));
        }

        let (train_idx, test_idx) = stratified_split(&labels, self.params.seed)?;

        let train_rows: Vec<Vec<f64>> = train_idx.iter().map(|&i| rows[i].clone()).collect();
        let train_labels: Vec<u8> = train_idx.iter().map(|&i| labels[i]).collect();
        let pos = train_labels.iter().filter(|&&l| l == 1).count();
        let neg = train_labels.len() - pos;
        let scale_pos_weight = neg as f64 / pos.max(1) as f64;

        let model = GbdtClassifier::fit(&train_rows, &train_labels, scale_pos_weight, self.params.clone());

        let actuals: Vec<u8> = test_idx.iter().map(|&i| labels[i]).collect();
        let probabilities: Vec<f64> = test_idx.iter().map(|&i| model.predict_proba(&rows[i])).collect();
        let predictions: Vec<u8> = probabilities.iter().map(|&p| u8::from(p > 0.5)).collect();
        let report = metrics::classification_metrics(&actuals, &predictions, &probabilities);

        info!(
            train_rows = train_idx.len(),
            test_rows = test_idx.len(),
            scale_pos_weight,
            accuracy = report.accuracy,
            auc = report.auc_roc,
            "delivery predictor trained"
        );

        if let Ok(mut guard) = self.fitted.write() {
            *guard = Some(Arc::new(FittedDelivery {
                model,
                feature_names,
                encoders,
            }));
        }

        Ok(DeliveryTraining {
            metrics: report,
            actuals,
            predictions,
            probabilities,
        })
    }

    /// Score a single hypothetical order. Never fails on unseen
    /// categorical values; missing fields default to zero.
    pub fn predict_single(&self, order: &OrderAttributes) -> Result<SinglePrediction, ServiceError> {
        let fitted = self.fitted().ok_or_else(|| {
            ServiceError::ModelNotTrained("train the delivery predictor first".to_string())
        })?;

        let mut values: HashMap<&str, f64> = HashMap::new();
        values.insert("unit_price", order.unit_price.unwrap_or(0.0));
        values.insert("quantity", order.quantity.unwrap_or(0.0));
        values.insert("revenue", order.revenue.unwrap_or(0.0));
        values.insert("discount_percent", order.discount_percent.unwrap_or(0.0));
        values.insert("profit_margin", order.profit_margin.unwrap_or(0.0));
        values.insert(
            "scheduled_shipping_days",
            order.scheduled_shipping_days.unwrap_or(0.0),
        );
        values.insert("order_month", order.order_month.unwrap_or(0.0));
        values.insert("order_quarter", order.order_quarter.unwrap_or(0.0));
        values.insert("order_day_of_week", order.order_day_of_week.unwrap_or(0.0));
        insert_encoded(&mut values, &fitted.encoders, "product_category", order.category.as_deref());
        insert_encoded(&mut values, &fitted.encoders, "region", order.region.as_deref());
        insert_encoded(&mut values, &fitted.encoders, "shipping_mode", order.shipping_mode.as_deref());
        insert_encoded(&mut values, &fitted.encoders, "customer_segment", order.customer_segment.as_deref());
        insert_encoded(&mut values, &fitted.encoders, "department", order.department.as_deref());
        insert_interactions(&mut values);

        let row = ordered_row(&fitted.feature_names, &values);
        let late_probability = fitted.model.predict_proba(&row);

        Ok(SinglePrediction {
            prediction: u8::from(late_probability > 0.5),
            late_probability,
            on_time_probability: 1.0 - late_probability,
            risk_level: DeliveryRisk::from_probability(late_probability),
        })
    }

    /// Ranked (feature, importance) pairs; empty when untrained.
    pub fn feature_importance(&self, top_n: usize) -> Vec<(String, f64)> {
        let Some(fitted) = self.fitted() else {
            return Vec::new();
        };
        let mut pairs: Vec<(String, f64)> = fitted
            .feature_names
            .iter()
            .cloned()
            .zip(fitted.model.feature_importances())
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs.truncate(top_n);
        pairs
    }
}

impl Default for DeliveryPredictor {
    fn default() -> Self {
        Self::new()
    }
}

fn build_feature_names(
    caps: &crate::dataset::SchemaCapabilities,
    encoders: &HashMap<String, LabelEncoder>,
) -> Vec<String> {
    let mut names = vec![
        "unit_price".to_string(),
        "quantity".to_string(),
        "revenue".to_string(),
        "discount_percent".to_string(),
    ];
    if caps.has_profit_margin {
        names.push("profit_margin".to_string());
    }
    names.extend([
        "scheduled_shipping_days".to_string(),
        "order_month".to_string(),
        "order_quarter".to_string(),
        "order_day_of_week".to_string(),
    ]);
    for col in [
        "product_category",
        "region",
        "shipping_mode",
        "customer_segment",
        "department",
    ] {
        if encoders.contains_key(col) {
            names.push(format!("{col}_encoded"));
        }
    }
    names.extend([
        "price_x_quantity".to_string(),
        "discount_x_price".to_string(),
        "scheduled_x_qty".to_string(),
    ]);
    names
}

fn insert_encoded(
    values: &mut HashMap<&str, f64>,
    encoders: &HashMap<String, LabelEncoder>,
    column: &'static str,
    value: Option<&str>,
) {
    if let Some(encoder) = encoders.get(column) {
        let code = value.map_or(crate::ml::encoder::UNSEEN_CODE, |v| encoder.encode(v));
        let key: &'static str = match column {
            "product_category" => "product_category_encoded",
            "region" => "region_encoded",
            "shipping_mode" => "shipping_mode_encoded",
            "customer_segment" => "customer_segment_encoded",
            _ => "department_encoded",
        };
        values.insert(key, code as f64);
    }
}

fn insert_interactions(values: &mut HashMap<&str, f64>) {
    let price = values.get("unit_price").copied().unwrap_or(0.0);
    let quantity = values.get("quantity").copied().unwrap_or(0.0);
    let discount = values.get("discount_percent").copied().unwrap_or(0.0);
    let scheduled = values.get("scheduled_shipping_days").copied().unwrap_or(0.0);
    values.insert("price_x_quantity", price * quantity);
    values.insert("discount_x_price", discount * price);
    values.insert("scheduled_x_qty", scheduled * quantity);
}

fn ordered_row(feature_names: &[String], values: &HashMap<&str, f64>) -> Vec<f64> {
    feature_names
        .iter()
        .map(|name| values.get(name.as_str()).copied().unwrap_or(0.0))
        .collect()
}

/// Per-class shuffled 80/20 split so both splits keep the training class
/// balance.
fn stratified_split(labels: &[u8], seed: u64) -> Result<(Vec<usize>, Vec<usize>), ServiceError> {
    let mut positives: Vec<usize> = Vec::new();
    let mut negatives: Vec<usize> = Vec::new();
    for (i, &l) in labels.iter().enumerate() {
        if l == 1 {
            positives.push(i);
        } else {
            negatives.push(i);
        }
    }
    if positives.is_empty() || negatives.is_empty() {
        return Err(ServiceError::InsufficientData(
            "both late and on-time orders are required to train".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in [&mut positives, &mut negatives] {
        class.shuffle(&mut rng);
        let n_test = ((class.len() as f64 * TEST_FRACTION).ceil() as usize)
            .clamp(1, class.len().saturating_sub(1).max(1));
        test.extend_from_slice(&class[..n_test]);
        train.extend_from_slice(&class[n_test..]);
    }
    if train.is_empty() {
        return Err(ServiceError::InsufficientData(
            "not enough orders for a train/test split".to_string(),
        ));
    }
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::OrderRecord;
    use chrono::NaiveDate;

    fn fast_params() -> GbdtParams {
        GbdtParams {
            n_trees: 40,
            max_depth: 3,
            min_samples_leaf: 2,
            ..GbdtParams::default()
        }
    }

    fn order(i: i64, shipping_mode: &str, scheduled: f64, late: bool) -> OrderRecord {
        OrderRecord {
            order_id: i,
            order_date: NaiveDate::from_ymd_opt(2017, 6, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            shipping_date: None,
            product_category: if i % 2 == 0 { "Cleats" } else { "Books" }.to_string(),
            product_name: "Item".to_string(),
            region: "Europe".to_string(),
            sub_region: None,
            customer_segment: "Consumer".to_string(),
            shipping_mode: shipping_mode.to_string(),
            order_status: "COMPLETE".to_string(),
            delivery_status: None,
            late_delivery: late,
            quantity: 1.0 + (i % 5) as f64,
            unit_price: 20.0 + (i % 7) as f64,
            revenue: 50.0,
            profit: Some(5.0),
            benefit: None,
            total_price: None,
            actual_shipping_days: if late { scheduled + 2.0 } else { scheduled },
            scheduled_shipping_days: scheduled,
            discount_percent: 0.05,
            profit_margin: Some(0.1),
            department: Some("Fan Shop".to_string()),
            latitude: None,
            longitude: None,
            payment_type: None,
            order_year: 0,
            order_month: 0,
            order_quarter: 0,
            order_day_of_week: 0,
            delivery_delay_days: 0.0,
        }
    }

    fn separable_dataset() -> Dataset {
        let mut records = Vec::new();
        for i in 0..60 {
            // Standard Class is always late, Same Day always on time.
            records.push(order(i, "Standard Class", 4.0, true));
            records.push(order(i + 100, "Same Day", 1.0, false));
        }
        Dataset::from_records(records)
    }

    #[test]
    fn train_separates_clear_signal() {
        let predictor = DeliveryPredictor::with_params(fast_params());
        let report = predictor.train(&separable_dataset()).unwrap();
        assert!(report.metrics.accuracy > 0.9);
        assert!(report.metrics.auc_roc > 0.9);
        let [[tn, fp], [fn_, tp]] = report.metrics.confusion_matrix;
        assert_eq!((tn + fp + fn_ + tp) as usize, report.actuals.len());
    }

    #[test]
    fn predict_single_before_training_fails() {
        let predictor = DeliveryPredictor::with_params(fast_params());
        let err = predictor.predict_single(&OrderAttributes::default()).unwrap_err();
        assert!(matches!(err, ServiceError::ModelNotTrained(_)));
    }

    #[test]
    fn unseen_categories_never_panic_and_probabilities_sum_to_one() {
        let predictor = DeliveryPredictor::with_params(fast_params());
        predictor.train(&separable_dataset()).unwrap();

        let order = OrderAttributes {
            category: Some("Completely Unknown Category".to_string()),
            region: Some("Atlantis".to_string()),
            shipping_mode: Some("Teleport".to_string()),
            quantity: Some(3.0),
            unit_price: Some(25.0),
            scheduled_shipping_days: Some(4.0),
            ..Default::default()
        };
        let result = predictor.predict_single(&order).unwrap();
        assert!((result.late_probability + result.on_time_probability - 1.0).abs() < 1e-9);
    }

    #[test]
    fn risk_bands_follow_probability() {
        assert_eq!(DeliveryRisk::from_probability(0.9), DeliveryRisk::High);
        assert_eq!(DeliveryRisk::from_probability(0.5), DeliveryRisk::Medium);
        assert_eq!(DeliveryRisk::from_probability(0.1), DeliveryRisk::Low);
    }

    #[test]
    fn single_class_data_is_insufficient() {
        let records: Vec<_> = (0..20).map(|i| order(i, "Same Day", 1.0, false)).collect();
        let predictor = DeliveryPredictor::with_params(fast_params());
        let err = predictor.train(&Dataset::from_records(records)).unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientData(_)));
    }

    #[test]
    fn feature_importance_includes_interactions() {
        let predictor = DeliveryPredictor::with_params(fast_params());
        predictor.train(&separable_dataset()).unwrap();
        let ranked = predictor.feature_importance(50);
        assert!(!ranked.is_empty());
        assert!(ranked.iter().any(|(name, _)| name == "scheduled_x_qty"
            || name == "price_x_quantity"
            || name == "discount_x_price"
            || name.ends_with("_encoded")
            || name == "scheduled_shipping_days"));
    }
}
