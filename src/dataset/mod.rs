/*!
 * # Dataset Contract
 *
 * Order-level tabular data consumed by every analytical engine. Records are
 * immutable once loaded; optional source columns are resolved once into
 * [`SchemaCapabilities`] at ingestion instead of being re-checked ad hoc.
 */

pub mod ingest;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One order line from the source dataset, with derived calendar fields
/// computed once at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: i64,
    pub order_date: NaiveDateTime,
    pub shipping_date: Option<NaiveDateTime>,
    pub product_category: String,
    pub product_name: String,
    pub region: String,
    pub sub_region: Option<String>,
    pub customer_segment: String,
    pub shipping_mode: String,
    pub order_status: String,
    pub delivery_status: Option<String>,
    /// 1 when the order shipped later than scheduled.
    pub late_delivery: bool,
    pub quantity: f64,
    pub unit_price: f64,
    pub revenue: f64,
    pub profit: Option<f64>,
    pub benefit: Option<f64>,
    pub total_price: Option<f64>,
    pub actual_shipping_days: f64,
    pub scheduled_shipping_days: f64,
    pub discount_percent: f64,
    pub profit_margin: Option<f64>,
    pub department: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub payment_type: Option<String>,

    // Derived at load.
    pub order_year: i32,
    pub order_month: u32,
    pub order_quarter: u32,
    /// Monday = 0 .. Sunday = 6.
    pub order_day_of_week: u32,
    /// actual - scheduled shipping days; positive means late.
    pub delivery_delay_days: f64,
}

impl OrderRecord {
    /// Recompute the derived calendar fields from `order_date` and the
    /// shipping-day columns. Called once per record at load.
    pub fn finalize(&mut self) {
        let d = self.order_date.date();
        self.order_year = d.year();
        self.order_month = d.month();
        self.order_quarter = (d.month() - 1) / 3 + 1;
        self.order_day_of_week = d.weekday().num_days_from_monday();
        self.delivery_delay_days = self.actual_shipping_days - self.scheduled_shipping_days;
    }
}

/// Which optional source columns were actually present, resolved once at
/// ingestion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SchemaCapabilities {
    pub has_department: bool,
    pub has_profit: bool,
    pub has_profit_margin: bool,
    pub has_delivery_status: bool,
    pub has_geolocation: bool,
    pub has_payment_type: bool,
}

impl SchemaCapabilities {
    fn resolve(records: &[OrderRecord]) -> Self {
        Self {
            has_department: records.iter().any(|r| r.department.is_some()),
            has_profit: records.iter().any(|r| r.profit.is_some()),
            has_profit_margin: records.iter().any(|r| r.profit_margin.is_some()),
            has_delivery_status: records.iter().any(|r| r.delivery_status.is_some()),
            has_geolocation: records.iter().any(|r| r.latitude.is_some() && r.longitude.is_some()),
            has_payment_type: records.iter().any(|r| r.payment_type.is_some()),
        }
    }
}

/// Relative time window filters, anchored to the newest order date in the
/// dataset rather than the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimePeriod {
    #[default]
    All,
    LastMonth,
    LastQuarter,
    LastYear,
}

impl TimePeriod {
    pub fn parse(s: &str) -> Self {
        match s {
            "last_month" => TimePeriod::LastMonth,
            "last_quarter" => TimePeriod::LastQuarter,
            "last_year" => TimePeriod::LastYear,
            _ => TimePeriod::All,
        }
    }

    fn window_days(self) -> Option<i64> {
        match self {
            TimePeriod::All => None,
            TimePeriod::LastMonth => Some(30),
            TimePeriod::LastQuarter => Some(90),
            TimePeriod::LastYear => Some(365),
        }
    }
}

/// Loose filter over the dataset. All text matches are case-insensitive
/// substring matches, so agent-supplied fragments like "shop" are accepted.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub category: Option<String>,
    pub region: Option<String>,
    pub department: Option<String>,
    pub time_period: TimePeriod,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Daily aggregate of the order stream, per category or global.
#[derive(Debug, Clone, Serialize)]
pub struct DailyDemand {
    pub date: NaiveDate,
    pub demand: f64,
    pub revenue: f64,
    pub num_orders: f64,
    pub avg_price: f64,
    pub avg_discount: f64,
}

/// Month-level revenue and order rollup.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyTrend {
    /// First day of the month.
    pub month: NaiveDate,
    pub revenue: f64,
    pub orders: usize,
    pub profit: f64,
    pub avg_order_value: f64,
}

/// Headline KPIs over the full dataset.
#[derive(Debug, Clone, Serialize)]
pub struct KpiMetrics {
    pub total_orders: usize,
    pub total_revenue: f64,
    pub total_profit: f64,
    pub avg_order_value: f64,
    pub on_time_rate: f64,
    pub avg_shipping_days: f64,
    pub cancellation_rate: f64,
    pub fraud_rate: f64,
    pub avg_discount: f64,
}

/// Immutable-per-request order dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<OrderRecord>,
    capabilities: SchemaCapabilities,
}

impl Dataset {
    pub fn from_records(mut records: Vec<OrderRecord>) -> Self {
        for r in &mut records {
            r.finalize();
        }
        let capabilities = SchemaCapabilities::resolve(&records);
        Self { records, capabilities }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[OrderRecord] {
        &self.records
    }

    pub fn capabilities(&self) -> SchemaCapabilities {
        self.capabilities
    }

    pub fn last_order_date(&self) -> Option<NaiveDateTime> {
        self.records.iter().map(|r| r.order_date).max()
    }

    /// Apply a loose filter, returning record views. An empty result is a
    /// valid, reportable state, not an error.
    pub fn select(&self, filter: &OrderFilter) -> Vec<&OrderRecord> {
        let cutoff = filter
            .time_period
            .window_days()
            .zip(self.last_order_date())
            .map(|(days, last)| last - Duration::days(days));

        self.records
            .iter()
            .filter(|r| cutoff.map_or(true, |c| r.order_date >= c))
            .filter(|r| {
                filter
                    .category
                    .as_deref()
                    .map_or(true, |c| contains_ci(&r.product_category, c))
            })
            .filter(|r| filter.region.as_deref().map_or(true, |x| contains_ci(&r.region, x)))
            .filter(|r| {
                filter.department.as_deref().map_or(true, |d| {
                    r.department.as_deref().map_or(false, |rd| contains_ci(rd, d))
                })
            })
            .collect()
    }

    fn distinct<F>(&self, f: F) -> Vec<String>
    where
        F: Fn(&OrderRecord) -> Option<&str>,
    {
        let set: BTreeSet<&str> = self.records.iter().filter_map(|r| f(r)).collect();
        set.into_iter().map(str::to_string).collect()
    }

    pub fn categories(&self) -> Vec<String> {
        self.distinct(|r| Some(r.product_category.as_str()))
    }

    pub fn departments(&self) -> Vec<String> {
        self.distinct(|r| r.department.as_deref())
    }

    pub fn regions(&self) -> Vec<String> {
        self.distinct(|r| Some(r.region.as_str()))
    }

    pub fn shipping_modes(&self) -> Vec<String> {
        self.distinct(|r| Some(r.shipping_mode.as_str()))
    }

    /// Build the daily demand series, optionally restricted to one product
    /// category (exact match). Rebuilt on every call; never persisted.
    pub fn daily_demand(&self, category: Option<&str>) -> Vec<DailyDemand> {
        struct Acc {
            demand: f64,
            revenue: f64,
            orders: f64,
            price_sum: f64,
            discount_sum: f64,
        }

        let mut days: BTreeMap<NaiveDate, Acc> = BTreeMap::new();
        for r in &self.records {
            if let Some(cat) = category {
                if r.product_category != cat {
                    continue;
                }
            }
            let acc = days.entry(r.order_date.date()).or_insert(Acc {
                demand: 0.0,
                revenue: 0.0,
                orders: 0.0,
                price_sum: 0.0,
                discount_sum: 0.0,
            });
            acc.demand += r.quantity;
            acc.revenue += r.revenue;
            acc.orders += 1.0;
            acc.price_sum += r.unit_price;
            acc.discount_sum += r.discount_percent;
        }

        days.into_iter()
            .map(|(date, a)| DailyDemand {
                date,
                demand: a.demand,
                revenue: a.revenue,
                num_orders: a.orders,
                avg_price: a.price_sum / a.orders,
                avg_discount: a.discount_sum / a.orders,
            })
            .collect()
    }

    /// Month-level revenue and order trend, chronologically sorted.
    pub fn monthly_trends(&self) -> Vec<MonthlyTrend> {
        struct Acc {
            revenue: f64,
            orders: usize,
            profit: f64,
        }

        let mut months: BTreeMap<NaiveDate, Acc> = BTreeMap::new();
        for r in &self.records {
            let d = r.order_date.date();
            if let Some(month) = NaiveDate::from_ymd_opt(d.year(), d.month(), 1) {
                let acc = months.entry(month).or_insert(Acc {
                    revenue: 0.0,
                    orders: 0,
                    profit: 0.0,
                });
                acc.revenue += r.revenue;
                acc.orders += 1;
                acc.profit += r.profit.unwrap_or(0.0);
            }
        }

        months
            .into_iter()
            .map(|(month, a)| MonthlyTrend {
                month,
                revenue: a.revenue,
                orders: a.orders,
                profit: a.profit,
                avg_order_value: a.revenue / a.orders.max(1) as f64,
            })
            .collect()
    }

    /// Headline KPIs over the whole dataset.
    pub fn kpi_metrics(&self) -> KpiMetrics {
        let all: Vec<&OrderRecord> = self.records.iter().collect();
        Self::kpis_over(&all)
    }

    /// Headline KPIs over an arbitrary selection, as returned by
    /// [`Dataset::select`]. Single source of truth for the summary numbers
    /// the query tool reports.
    pub fn kpis_over(records: &[&OrderRecord]) -> KpiMetrics {
        let n = records.len();
        if n == 0 {
            return KpiMetrics {
                total_orders: 0,
                total_revenue: 0.0,
                total_profit: 0.0,
                avg_order_value: 0.0,
                on_time_rate: 0.0,
                avg_shipping_days: 0.0,
                cancellation_rate: 0.0,
                fraud_rate: 0.0,
                avg_discount: 0.0,
            };
        }

        let total_revenue: f64 = records.iter().map(|r| r.revenue).sum();
        let total_profit: f64 = records.iter().filter_map(|r| r.profit).sum();
        let late: usize = records.iter().filter(|r| r.late_delivery).count();
        let shipping_sum: f64 = records.iter().map(|r| r.actual_shipping_days).sum();
        let discount_sum: f64 = records.iter().map(|r| r.discount_percent).sum();
        let cancelled = records.iter().filter(|r| r.order_status == "CANCELED").count();
        let fraud = records
            .iter()
            .filter(|r| r.order_status == "SUSPECTED_FRAUD")
            .count();

        KpiMetrics {
            total_orders: n,
            total_revenue,
            total_profit,
            avg_order_value: total_revenue / n as f64,
            on_time_rate: (1.0 - late as f64 / n as f64) * 100.0,
            avg_shipping_days: shipping_sum / n as f64,
            cancellation_rate: cancelled as f64 / n as f64 * 100.0,
            fraud_rate: fraud as f64 / n as f64 * 100.0,
            avg_discount: discount_sum / n as f64 * 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(date: &str, category: &str, quantity: f64, revenue: f64) -> OrderRecord {
        OrderRecord {
            order_id: 1,
            order_date: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            shipping_date: None,
            product_category: category.to_string(),
            product_name: "Widget".to_string(),
            region: "Europe".to_string(),
            sub_region: None,
            customer_segment: "Consumer".to_string(),
            shipping_mode: "Standard Class".to_string(),
            order_status: "COMPLETE".to_string(),
            delivery_status: None,
            late_delivery: false,
            quantity,
            unit_price: 10.0,
            revenue,
            profit: Some(revenue * 0.1),
            benefit: None,
            total_price: None,
            actual_shipping_days: 4.0,
            scheduled_shipping_days: 4.0,
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

    #[test]
    fn derived_fields_computed_on_load() {
        let ds = Dataset::from_records(vec![record("2017-11-15", "Cleats", 2.0, 100.0)]);
        let r = &ds.records()[0];
        assert_eq!(r.order_year, 2017);
        assert_eq!(r.order_month, 11);
        assert_eq!(r.order_quarter, 4);
        // 2017-11-15 was a Wednesday.
        assert_eq!(r.order_day_of_week, 2);
    }

    #[test]
    fn daily_demand_aggregates_by_day_and_category() {
        let ds = Dataset::from_records(vec![
            record("2017-01-01", "Cleats", 2.0, 100.0),
            record("2017-01-01", "Cleats", 3.0, 150.0),
            record("2017-01-02", "Cleats", 1.0, 50.0),
            record("2017-01-01", "Books", 7.0, 70.0),
        ]);

        let series = ds.daily_demand(Some("Cleats"));
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].demand, 5.0);
        assert_eq!(series[0].num_orders, 2.0);
        assert_eq!(series[1].demand, 1.0);

        let global = ds.daily_demand(None);
        assert_eq!(global[0].demand, 12.0);
    }

    #[test]
    fn select_is_case_insensitive_substring() {
        let ds = Dataset::from_records(vec![
            record("2017-01-01", "Cleats", 1.0, 10.0),
            record("2017-01-01", "Books", 1.0, 10.0),
        ]);
        let filter = OrderFilter {
            category: Some("cleat".to_string()),
            ..Default::default()
        };
        assert_eq!(ds.select(&filter).len(), 1);

        let none = OrderFilter {
            category: Some("garden".to_string()),
            ..Default::default()
        };
        assert!(ds.select(&none).is_empty());
    }

    #[test]
    fn time_period_is_anchored_to_last_order_date() {
        let ds = Dataset::from_records(vec![
            record("2016-01-01", "Cleats", 1.0, 10.0),
            record("2017-12-01", "Cleats", 1.0, 10.0),
            record("2017-12-20", "Cleats", 1.0, 10.0),
        ]);
        let filter = OrderFilter {
            time_period: TimePeriod::LastMonth,
            ..Default::default()
        };
        assert_eq!(ds.select(&filter).len(), 2);
    }

    #[test]
    fn monthly_trends_aggregate_by_calendar_month() {
        let ds = Dataset::from_records(vec![
            record("2017-01-05", "Cleats", 1.0, 100.0),
            record("2017-01-25", "Cleats", 1.0, 300.0),
            record("2017-02-01", "Books", 1.0, 50.0),
        ]);
        let trends = ds.monthly_trends();
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].orders, 2);
        assert!((trends[0].revenue - 400.0).abs() < 1e-9);
        assert!((trends[0].avg_order_value - 200.0).abs() < 1e-9);
        assert_eq!(trends[1].month, NaiveDate::from_ymd_opt(2017, 2, 1).unwrap());
    }

    #[test]
    fn kpis_can_be_computed_over_a_selection() {
        let ds = Dataset::from_records(vec![
            record("2017-01-01", "Cleats", 1.0, 100.0),
            record("2017-01-01", "Books", 1.0, 50.0),
        ]);
        let filter = OrderFilter {
            category: Some("cleats".to_string()),
            ..Default::default()
        };
        let kpi = Dataset::kpis_over(&ds.select(&filter));
        assert_eq!(kpi.total_orders, 1);
        assert!((kpi.total_revenue - 100.0).abs() < 1e-9);

        let empty = Dataset::kpis_over(&[]);
        assert_eq!(empty.total_orders, 0);
    }

    #[test]
    fn kpi_metrics_on_uniform_orders() {
        let records: Vec<_> = (0..10)
            .map(|_| record("2017-06-01", "Cleats", 1.0, 100.0))
            .collect();
        let ds = Dataset::from_records(records);
        let kpi = ds.kpi_metrics();
        assert_eq!(kpi.total_orders, 10);
        assert!((kpi.total_revenue - 1000.0).abs() < 1e-9);
        assert!((kpi.avg_order_value - 100.0).abs() < 1e-9);
        assert!((kpi.on_time_rate - 100.0).abs() < 1e-9);
    }
}
