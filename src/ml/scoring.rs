/*!
 * # Supplier Scoring
 *
 * Weighted multi-criteria performance scoring. The source data carries no
 * explicit supplier identifiers, so each department acts as the scored
 * supply unit, falling back to product category when the department column
 * is absent. Six dimensions are normalized into [0, 1] and combined with
 * fixed weights summing to one.
 */

use crate::dataset::Dataset;
use crate::ml::metrics::min_max_normalize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Dimension weights. Delivery dominates; the rest split the remainder.
pub const WEIGHTS: [(&str, f64); 6] = [
    ("delivery_performance", 0.30),
    ("profitability", 0.20),
    ("volume_capability", 0.15),
    ("order_reliability", 0.15),
    ("cost_efficiency", 0.10),
    ("product_diversity", 0.10),
];

/// Risk bands over the overall score, highest risk first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SupplierRisk {
    Critical,
    High,
    Medium,
    Low,
    VeryLow,
}

impl SupplierRisk {
    pub fn as_str(self) -> &'static str {
        match self {
            SupplierRisk::Critical => "Critical",
            SupplierRisk::High => "High",
            SupplierRisk::Medium => "Medium",
            SupplierRisk::Low => "Low",
            SupplierRisk::VeryLow => "Very Low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// Shared score bins: (0, 0.3] F/Critical up to (0.8, 1.0] A/Very Low.
fn bin(score: f64) -> (Grade, SupplierRisk) {
    if score <= 0.3 {
        (Grade::F, SupplierRisk::Critical)
    } else if score <= 0.5 {
        (Grade::D, SupplierRisk::High)
    } else if score <= 0.65 {
        (Grade::C, SupplierRisk::Medium)
    } else if score <= 0.8 {
        (Grade::B, SupplierRisk::Low)
    } else {
        (Grade::A, SupplierRisk::VeryLow)
    }
}

/// The six normalized dimensions for one supplier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreDimensions {
    pub delivery_performance: f64,
    pub profitability: f64,
    pub volume_capability: f64,
    pub order_reliability: f64,
    pub cost_efficiency: f64,
    pub product_diversity: f64,
}

impl ScoreDimensions {
    pub fn get(&self, name: &str) -> f64 {
        match name {
            "delivery_performance" => self.delivery_performance,
            "profitability" => self.profitability,
            "volume_capability" => self.volume_capability,
            "order_reliability" => self.order_reliability,
            "cost_efficiency" => self.cost_efficiency,
            "product_diversity" => self.product_diversity,
            _ => 0.0,
        }
    }

    pub fn weighted_total(&self) -> f64 {
        WEIGHTS.iter().map(|(name, w)| self.get(name) * w).sum()
    }
}

/// One scored supply unit with the raw aggregates behind its score.
#[derive(Debug, Clone, Serialize)]
pub struct SupplierScore {
    pub supplier: String,
    pub total_orders: usize,
    pub total_revenue: f64,
    pub total_profit: f64,
    pub avg_profit_margin: f64,
    pub avg_shipping_days: f64,
    pub avg_scheduled_days: f64,
    pub late_delivery_rate: f64,
    pub avg_delay: f64,
    pub total_quantity: f64,
    pub num_categories: usize,
    pub avg_discount: f64,
    pub dimensions: ScoreDimensions,
    pub overall_score: f64,
    pub grade: Grade,
    pub risk_level: SupplierRisk,
}

/// Improvement suggestion keyed on a supplier's weakest dimension.
#[derive(Debug, Clone, Serialize)]
pub struct ImprovementSuggestion {
    pub supplier: String,
    pub score: f64,
    pub grade: Grade,
    pub risk_level: SupplierRisk,
    pub weakest_area: String,
    pub suggestion: String,
}

/// Risk distribution summary over the scored suppliers.
#[derive(Debug, Clone, Serialize)]
pub struct RiskSummary {
    pub total_entities: usize,
    pub avg_score: f64,
    pub best: Option<String>,
    pub worst: Option<String>,
    pub risk_distribution: BTreeMap<String, usize>,
}

struct Aggregate {
    orders: usize,
    revenue: f64,
    profit: f64,
    margin_sum: f64,
    margin_count: usize,
    shipping_sum: f64,
    scheduled_sum: f64,
    late: usize,
    delay_sum: f64,
    quantity: f64,
    categories: std::collections::BTreeSet<String>,
    discount_sum: f64,
}

/// Multi-criteria supplier scoring engine. Stateless between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupplierScorer;

impl SupplierScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score every supply unit, sorted by overall score descending.
    pub fn score_suppliers(&self, dataset: &Dataset) -> Vec<SupplierScore> {
        let by_department = dataset.capabilities().has_department;
        let mut groups: BTreeMap<String, Aggregate> = BTreeMap::new();

        for r in dataset.records() {
            let key = if by_department {
                match &r.department {
                    Some(d) => d.clone(),
                    None => continue,
                }
            } else {
                r.product_category.clone()
            };
            let agg = groups.entry(key).or_insert_with(|| Aggregate {
                orders: 0,
                revenue: 0.0,
                profit: 0.0,
                margin_sum: 0.0,
                margin_count: 0,
                shipping_sum: 0.0,
                scheduled_sum: 0.0,
                late: 0,
                delay_sum: 0.0,
                quantity: 0.0,
                categories: std::collections::BTreeSet::new(),
                discount_sum: 0.0,
            });
            agg.orders += 1;
            agg.revenue += r.revenue;
            agg.profit += r.profit.unwrap_or(0.0);
            if let Some(m) = r.profit_margin {
                agg.margin_sum += m;
                agg.margin_count += 1;
            }
            agg.shipping_sum += r.actual_shipping_days;
            agg.scheduled_sum += r.scheduled_shipping_days;
            agg.late += usize::from(r.late_delivery);
            agg.delay_sum += r.delivery_delay_days;
            agg.quantity += r.quantity;
            agg.categories.insert(r.product_category.clone());
            agg.discount_sum += r.discount_percent;
        }

        let names: Vec<String> = groups.keys().cloned().collect();
        let rows: Vec<&Aggregate> = groups.values().collect();

        let margins: Vec<f64> = rows
            .iter()
            .map(|a| {
                if a.margin_count > 0 {
                    a.margin_sum / a.margin_count as f64
                } else {
                    0.0
                }
            })
            .collect();
        let quantities: Vec<f64> = rows.iter().map(|a| a.quantity).collect();
        let discounts: Vec<f64> = rows
            .iter()
            .map(|a| a.discount_sum / a.orders.max(1) as f64)
            .collect();
        let diversities: Vec<f64> = rows.iter().map(|a| a.categories.len() as f64).collect();

        let profitability = min_max_normalize(&margins);
        let volume = min_max_normalize(&quantities);
        let cost_efficiency: Vec<f64> =
            min_max_normalize(&discounts).into_iter().map(|v| 1.0 - v).collect();
        let diversity = min_max_normalize(&diversities);

        let mut scored: Vec<SupplierScore> = Vec::with_capacity(rows.len());
        for (i, a) in rows.iter().enumerate() {
            let n = a.orders as f64;
            let late_rate = a.late as f64 / n;
            let avg_delay = a.delay_sum / n;
            let avg_scheduled = a.scheduled_sum / n;

            let dimensions = ScoreDimensions {
                delivery_performance: 1.0 - late_rate,
                profitability: profitability[i],
                volume_capability: volume[i],
                order_reliability: (1.0
                    - avg_delay.max(0.0) / avg_scheduled.max(1.0))
                .clamp(0.0, 1.0),
                cost_efficiency: cost_efficiency[i],
                product_diversity: diversity[i],
            };
            let overall_score = dimensions.weighted_total();
            let (grade, risk_level) = bin(overall_score);

            scored.push(SupplierScore {
                supplier: names[i].clone(),
                total_orders: a.orders,
                total_revenue: a.revenue,
                total_profit: a.profit,
                avg_profit_margin: margins[i],
                avg_shipping_days: a.shipping_sum / n,
                avg_scheduled_days: avg_scheduled,
                late_delivery_rate: late_rate,
                avg_delay,
                total_quantity: a.quantity,
                num_categories: a.categories.len(),
                avg_discount: discounts[i],
                dimensions,
                overall_score,
                grade,
                risk_level,
            });
        }

        scored.sort_by(|a, b| b.overall_score.total_cmp(&a.overall_score));
        debug!(suppliers = scored.len(), by_department, "suppliers scored");
        scored
    }

    /// Distribution of risk bands over an already-scored list.
    pub fn get_risk_summary(&self, scored: &[SupplierScore]) -> RiskSummary {
        let mut risk_distribution: BTreeMap<String, usize> = BTreeMap::new();
        for s in scored {
            *risk_distribution.entry(s.risk_level.as_str().to_string()).or_default() += 1;
        }
        let avg_score = if scored.is_empty() {
            0.0
        } else {
            scored.iter().map(|s| s.overall_score).sum::<f64>() / scored.len() as f64
        };
        RiskSummary {
            total_entities: scored.len(),
            avg_score,
            best: scored.first().map(|s| s.supplier.clone()),
            worst: scored.last().map(|s| s.supplier.clone()),
            risk_distribution,
        }
    }

    /// One suggestion per supplier whose weakest dimension falls below 0.5.
    pub fn get_improvement_suggestions(
        &self,
        scored: &[SupplierScore],
    ) -> Vec<ImprovementSuggestion> {
        let mut suggestions = Vec::new();
        for s in scored {
            let mut weak: Vec<(&str, f64)> = WEIGHTS
                .iter()
                .map(|(name, _)| (*name, s.dimensions.get(name)))
                .filter(|(_, v)| *v < 0.5)
                .collect();
            if weak.is_empty() {
                continue;
            }
            weak.sort_by(|a, b| a.1.total_cmp(&b.1));
            let (area, _) = weak[0];

            let suggestion = match area {
                "delivery_performance" => format!(
                    "Late rate is {:.1}%. Consider faster shipping modes or better scheduling.",
                    s.late_delivery_rate * 100.0
                ),
                "profitability" => format!(
                    "Profit margin is low ({:.1}%). Review pricing or reduce discounts.",
                    s.avg_profit_margin * 100.0
                ),
                "volume_capability" => {
                    "Low order volume. Explore demand growth or consolidate orders.".to_string()
                }
                "order_reliability" => format!(
                    "Average delay is {:.1} days. Improve scheduling accuracy.",
                    s.avg_delay
                ),
                "cost_efficiency" => format!(
                    "Average discount rate is {:.1}%. Reduce unnecessary discounts.",
                    s.avg_discount * 100.0
                ),
                "product_diversity" => format!(
                    "Only {} categories. Expand product range.",
                    s.num_categories
                ),
                _ => "Review overall performance.".to_string(),
            };

            suggestions.push(ImprovementSuggestion {
                supplier: s.supplier.clone(),
                score: s.overall_score,
                grade: s.grade,
                risk_level: s.risk_level,
                weakest_area: title_case(area),
                suggestion,
            });
        }
        suggestions
    }
}

fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::OrderRecord;
    use chrono::NaiveDate;

    fn order(dept: &str, category: &str, late: bool, margin: f64, discount: f64) -> OrderRecord {
        OrderRecord {
            order_id: 1,
            order_date: NaiveDate::from_ymd_opt(2017, 6, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            shipping_date: None,
            product_category: category.to_string(),
            product_name: "Item".to_string(),
            region: "Europe".to_string(),
            sub_region: None,
            customer_segment: "Consumer".to_string(),
            shipping_mode: "Standard Class".to_string(),
            order_status: "COMPLETE".to_string(),
            delivery_status: None,
            late_delivery: late,
            quantity: 3.0,
            unit_price: 20.0,
            revenue: 60.0,
            profit: Some(60.0 * margin),
            benefit: None,
            total_price: None,
            actual_shipping_days: if late { 6.0 } else { 3.0 },
            scheduled_shipping_days: 4.0,
            discount_percent: discount,
            profit_margin: Some(margin),
            department: Some(dept.to_string()),
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

    fn two_department_dataset() -> Dataset {
        let mut records = Vec::new();
        for i in 0..30 {
            // Strong department: on time, high margin, low discount, two categories.
            let cat = if i % 2 == 0 { "Cleats" } else { "Gloves" };
            records.push(order("Fan Shop", cat, false, 0.25, 0.02));
            // Weak department: always late, thin margin, heavy discount.
            records.push(order("Outdoors", "Tents", true, 0.02, 0.30));
        }
        Dataset::from_records(records)
    }

    #[test]
    fn weights_sum_to_one() {
        let total: f64 = WEIGHTS.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn scores_are_bounded_and_ordered() {
        let scored = SupplierScorer::new().score_suppliers(&two_department_dataset());
        assert_eq!(scored.len(), 2);
        for s in &scored {
            assert!((0.0..=1.0).contains(&s.overall_score));
            for (name, _) in WEIGHTS {
                let v = s.dimensions.get(name);
                assert!((0.0..=1.0).contains(&v), "{name} out of range: {v}");
            }
        }
        assert_eq!(scored[0].supplier, "Fan Shop");
        assert!(scored[0].overall_score > scored[1].overall_score);
    }

    #[test]
    fn grade_and_risk_use_the_same_bins() {
        for (score, grade, risk) in [
            (0.2, Grade::F, SupplierRisk::Critical),
            (0.4, Grade::D, SupplierRisk::High),
            (0.6, Grade::C, SupplierRisk::Medium),
            (0.75, Grade::B, SupplierRisk::Low),
            (0.95, Grade::A, SupplierRisk::VeryLow),
        ] {
            assert_eq!(bin(score), (grade, risk));
        }
    }

    #[test]
    fn risk_summary_names_best_and_worst() {
        let scorer = SupplierScorer::new();
        let scored = scorer.score_suppliers(&two_department_dataset());
        let summary = scorer.get_risk_summary(&scored);
        assert_eq!(summary.total_entities, 2);
        assert_eq!(summary.best.as_deref(), Some("Fan Shop"));
        assert_eq!(summary.worst.as_deref(), Some("Outdoors"));
        assert_eq!(summary.risk_distribution.values().sum::<usize>(), 2);
    }

    #[test]
    fn suggestions_target_the_weak_department() {
        let scorer = SupplierScorer::new();
        let scored = scorer.score_suppliers(&two_department_dataset());
        let suggestions = scorer.get_improvement_suggestions(&scored);
        assert!(suggestions.iter().any(|s| s.supplier == "Outdoors"));
        for s in &suggestions {
            assert!(!s.suggestion.is_empty());
            assert!(!s.weakest_area.contains('_'));
        }
    }

    #[test]
    fn falls_back_to_category_without_departments() {
        let mut records = two_department_dataset().records().to_vec();
        for r in &mut records {
            r.department = None;
        }
        let scored = SupplierScorer::new().score_suppliers(&Dataset::from_records(records));
        // Grouped by product category instead.
        assert_eq!(scored.len(), 3);
    }
}
