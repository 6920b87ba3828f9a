/*!
 * # Deterministic Fallback Router
 *
 * Keyword routing used when no LLM endpoint is configured. Questions are
 * matched against fixed keyword groups, routed to the same tools the LLM
 * would call, and the JSON results rendered as markdown. Entity names are
 * recognized against the vocabularies observed in the loaded dataset, not
 * a hardcoded list.
 */

use crate::agent::tools::{self, ToolContext};
use crate::dataset::Dataset;
use serde_json::{json, Value};
use tracing::debug;

/// Keyword router over the agent tools.
pub struct FallbackRouter {
    categories: Vec<String>,
    departments: Vec<String>,
    shipping_modes: Vec<String>,
}

impl FallbackRouter {
    /// Vocabularies come from the dataset so routing adapts to whatever
    /// file was loaded.
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            categories: ctx.dataset.categories(),
            departments: ctx.dataset.departments(),
            shipping_modes: ctx.dataset.shipping_modes(),
        }
    }

    /// Route a question to a tool and render the result. Unroutable input
    /// gets the capability overview.
    pub fn respond(&self, question: &str, ctx: &ToolContext) -> String {
        let msg = question.to_lowercase();

        if contains_any(&msg, &["revenue", "sales", "order", "how many", "total"]) {
            let period = if msg.contains("year") { "last_year" } else { "all" };
            let result = tools::execute(
                "query_supply_chain_data",
                json!({"time_period": period}),
                ctx,
            );
            debug!(route = "query", "fallback routed");
            let mut reply = format_query(&result);
            if let Some(trend) = format_monthly_trend(&ctx.dataset, 6) {
                reply.push_str(&trend);
            }
            return reply;
        }

        if contains_any(&msg, &["forecast", "predict demand", "future demand"]) {
            let result = tools::execute(
                "run_demand_forecast",
                json!({"category": self.extract(&self.categories, &msg), "horizon_days": 30}),
                ctx,
            );
            return format_forecast(&result);
        }

        if contains_any(&msg, &["supplier", "vendor", "department"]) {
            return match self.extract(&self.departments, &msg) {
                Some(dept) => {
                    let result =
                        tools::execute("analyze_supplier", json!({"supplier_name": dept}), ctx);
                    format_supplier(&result)
                }
                None => format_query(&tools::execute("query_supply_chain_data", json!({}), ctx)),
            };
        }

        if contains_any(&msg, &["inventory", "stock", "reorder"]) {
            let result = tools::execute(
                "check_inventory_status",
                json!({"category": self.extract(&self.categories, &msg)}),
                ctx,
            );
            return format_inventory(&result);
        }

        if contains_any(&msg, &["delivery", "late", "delay", "shipping"]) {
            let result = tools::execute(
                "predict_delivery_risk",
                json!({
                    "category": self.extract(&self.categories, &msg),
                    "shipping_mode": self.extract(&self.shipping_modes, &msg),
                }),
                ctx,
            );
            return format_delivery(&result);
        }

        if contains_any(&msg, &["top", "best", "worst", "ranking"]) {
            let metric = if msg.contains("profit") { "profit" } else { "revenue" };
            let result = tools::execute(
                "get_top_products",
                json!({"metric": metric, "top_n": 10}),
                ctx,
            );
            return format_top_products(&result);
        }

        if contains_any(&msg, &["region", "compare", "geography", "market"]) {
            let result = tools::execute("compare_regions", json!({}), ctx);
            return format_regions(&result);
        }

        general_help()
    }

    /// First vocabulary entry mentioned in the message.
    fn extract(&self, vocabulary: &[String], msg: &str) -> Option<String> {
        vocabulary
            .iter()
            .find(|v| msg.contains(&v.to_lowercase()))
            .cloned()
    }
}

fn contains_any(msg: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| msg.contains(k))
}

fn field(data: &Value, key: &str) -> String {
    match &data[key] {
        Value::String(s) => s.clone(),
        Value::Null => "N/A".to_string(),
        other => other.to_string(),
    }
}

fn error_text(data: &Value) -> Option<String> {
    data["error"].as_str().map(str::to_string)
}

fn format_query(data: &Value) -> String {
    if let Some(e) = error_text(data) {
        return e;
    }
    if let Some(m) = data["message"].as_str() {
        return m.to_string();
    }
    format!(
        "**Supply Chain Data Summary**\n\n\
         | Metric | Value |\n|--------|-------|\n\
         | Total Orders | {} |\n\
         | Total Revenue | {} |\n\
         | Total Profit | {} |\n\
         | Avg Order Value | {} |\n\
         | Late Delivery Rate | {} |\n\
         | Avg Shipping Days | {} |\n\
         | Top Category | {} |\n\
         | Top Region | {} |\n\
         | Date Range | {} |\n\n\
         Ask about specific categories, departments, or market regions for detailed analysis.",
        field(data, "total_orders"),
        field(data, "total_revenue"),
        field(data, "total_profit"),
        field(data, "avg_order_value"),
        field(data, "late_delivery_rate"),
        field(data, "avg_shipping_days"),
        field(data, "top_category"),
        field(data, "top_region"),
        field(data, "date_range"),
    )
}

/// Markdown table of the most recent monthly revenue trend. `None` when
/// the data spans fewer than two calendar months.
fn format_monthly_trend(dataset: &Dataset, months: usize) -> Option<String> {
    let trends = dataset.monthly_trends();
    if trends.len() < 2 {
        return None;
    }
    let start = trends.len().saturating_sub(months);
    let rows: Vec<String> = trends[start..]
        .iter()
        .map(|t| {
            format!(
                "| {} | {} | {} | {} |",
                t.month.format("%Y-%m"),
                t.orders,
                tools::money(t.revenue),
                tools::money(t.avg_order_value),
            )
        })
        .collect();
    Some(format!(
        "\n\n**Recent Monthly Trend**\n\n\
         | Month | Orders | Revenue | Avg Order Value |\n\
         |-------|--------|---------|-----------------|\n{}",
        rows.join("\n")
    ))
}

fn format_forecast(data: &Value) -> String {
    if let Some(e) = error_text(data) {
        return e;
    }
    let fs = &data["forecast_summary"];
    let mm = &data["model_metrics"];
    format!(
        "**Demand Forecast: {}**\n\n\
         Forecast period: {}\n\n\
         Predictions:\n\
         - Average daily demand: {}\n\
         - Peak demand date: {}\n\
         - Peak demand: {}\n\
         - Total predicted demand: {}\n\n\
         Model accuracy: MAE {}, RMSE {}, R2 {}",
        field(data, "category"),
        field(data, "forecast_horizon"),
        field(fs, "avg_predicted_daily_demand"),
        field(fs, "peak_demand_date"),
        field(fs, "peak_demand_value"),
        field(fs, "total_predicted_demand"),
        field(mm, "MAE"),
        field(mm, "RMSE"),
        field(mm, "R2"),
    )
}

fn format_supplier(data: &Value) -> String {
    if let Some(e) = error_text(data) {
        let available = data["available_suppliers"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        return format!("{e}\n\n**Available departments:** {available}");
    }
    let metrics = &data["metrics"];
    let stats = &data["stats"];
    format!(
        "**Department Analysis: {}**\n\n\
         Overall score: {} | Grade: {} | Risk: {}\n\n\
         Performance:\n\
         - Delivery performance: {}\n\
         - Profitability: {}\n\
         - Volume capability: {}\n\
         - Order reliability: {}\n\
         - Cost efficiency: {}\n\
         - Product diversity: {}\n\n\
         Orders: {} | Revenue: {} | Avg shipping: {} | Late rate: {}",
        field(data, "supplier"),
        field(data, "overall_score"),
        field(data, "grade"),
        field(data, "risk_level"),
        field(metrics, "delivery_performance"),
        field(metrics, "profitability"),
        field(metrics, "volume_capability"),
        field(metrics, "order_reliability"),
        field(metrics, "cost_efficiency"),
        field(metrics, "product_diversity"),
        field(stats, "total_orders"),
        field(stats, "total_revenue"),
        field(stats, "avg_shipping_days"),
        field(stats, "late_delivery_rate"),
    )
}

fn format_inventory(data: &Value) -> String {
    if let Some(e) = error_text(data) {
        return e;
    }
    if let Some(categories) = data["categories"].as_array() {
        let rows: Vec<String> = categories
            .iter()
            .map(|c| {
                format!(
                    "| {} | {} | {} | {} | {} |",
                    field(c, "name"),
                    field(c, "eoq"),
                    field(c, "safety_stock"),
                    field(c, "daily_demand"),
                    field(c, "late_rate"),
                )
            })
            .collect();
        return format!(
            "**Inventory Optimization Overview**\n\n\
             | Category | EOQ | Safety Stock | Daily Demand | Late Rate |\n\
             |----------|-----|--------------|--------------|-----------|\n{}",
            rows.join("\n")
        );
    }
    let recs = data["recommendations"]
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(|r| format!("- {r}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "No critical issues detected.".to_string());
    format!(
        "**Inventory: {}**\n\n\
         | Metric | Value |\n|--------|-------|\n\
         | Avg Daily Demand | {} |\n\
         | Demand Variability | {} |\n\
         | Annual Demand | {} |\n\
         | Safety Stock (95%) | {} |\n\
         | Safety Stock (99%) | {} |\n\
         | EOQ | {} |\n\
         | Reorder Point | {} |\n\
         | Late Delivery Rate | {} |\n\n\
         Recommendations:\n{}",
        field(data, "category"),
        field(data, "avg_daily_demand"),
        field(data, "demand_variability"),
        field(data, "annual_demand"),
        field(data, "optimal_safety_stock_95"),
        field(data, "optimal_safety_stock_99"),
        field(data, "eoq"),
        field(data, "reorder_point"),
        field(data, "late_delivery_rate"),
        recs,
    )
}

fn format_delivery(data: &Value) -> String {
    if let Some(e) = error_text(data) {
        return e;
    }
    let pred = &data["prediction"];
    let params = &data["parameters"];
    format!(
        "**Delivery Risk Prediction**\n\n\
         Parameters: category={}, region={}, mode={}\n\n\
         | Metric | Value |\n|--------|-------|\n\
         | Late Delivery Probability | {} |\n\
         | Risk Level | {} |\n\
         | Avg Delay | {} |\n\
         | Based On | {} similar orders |\n\n\
         Recommendation: {}",
        field(params, "category"),
        field(params, "region"),
        field(params, "shipping_mode"),
        field(pred, "late_delivery_probability"),
        field(pred, "risk_level"),
        field(pred, "avg_delay_if_late"),
        field(pred, "matching_orders"),
        field(data, "recommendation"),
    )
}

fn format_top_products(data: &Value) -> String {
    if let Some(e) = error_text(data) {
        return e;
    }
    let rows: Vec<String> = data["top_products"]
        .as_array()
        .map(|a| {
            a.iter()
                .map(|p| {
                    format!(
                        "| {} | {} | {} | {} | {} |",
                        field(p, "rank"),
                        field(p, "category"),
                        field(p, "product"),
                        field(p, "value"),
                        field(p, "avg_price"),
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    format!(
        "**Top Products by {}**\n\n\
         | Rank | Category | Product | Value | Avg Price |\n\
         |------|----------|---------|-------|-----------|\n{}",
        field(data, "metric"),
        rows.join("\n")
    )
}

fn format_regions(data: &Value) -> String {
    if let Some(e) = error_text(data) {
        return e;
    }
    let rows: Vec<String> = data["regions"]
        .as_array()
        .map(|a| {
            a.iter()
                .map(|r| {
                    format!(
                        "| {} | {} | {} | {} | {} |",
                        field(r, "region"),
                        field(r, "orders"),
                        field(r, "revenue"),
                        field(r, "late_delivery_rate"),
                        field(r, "avg_delivery_days"),
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    format!(
        "**Market Region Performance Comparison**\n\n\
         | Region | Orders | Revenue | Late Rate | Avg Delivery |\n\
         |--------|--------|---------|-----------|--------------|\n{}",
        rows.join("\n")
    )
}

fn general_help() -> String {
    "**Supply Chain Intelligence Agent**\n\n\
     I can help you with:\n\n\
     - **Data analysis** - \"What's the total revenue for Electronics?\"\n\
     - **Demand forecasting** - \"Forecast demand for Sporting Goods\"\n\
     - **Department analysis** - \"Analyze the Fan Shop department\"\n\
     - **Inventory health** - \"Check inventory for Computers\"\n\
     - **Delivery prediction** - \"What's the delivery risk for Same Day shipping?\"\n\
     - **Product rankings** - \"Show top products by profit\"\n\
     - **Regional comparison** - \"Compare performance across market regions\"\n\n\
     Ask me anything about your supply chain."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, OrderRecord};
    use crate::ml::forecasting::DemandForecaster;
    use crate::ml::inventory::InventoryOptimizer;
    use crate::ml::scoring::SupplierScorer;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn order(i: i64) -> OrderRecord {
        OrderRecord {
            order_id: i,
            order_date: NaiveDate::from_ymd_opt(2017, 6, 1 + (i % 28) as u32)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            shipping_date: None,
            product_category: "Cleats".to_string(),
            product_name: "Cleats Item".to_string(),
            region: "Europe".to_string(),
            sub_region: None,
            customer_segment: "Consumer".to_string(),
            shipping_mode: "Standard Class".to_string(),
            order_status: "COMPLETE".to_string(),
            delivery_status: None,
            late_delivery: i % 2 == 0,
            quantity: 2.0,
            unit_price: 50.0,
            revenue: 100.0,
            profit: Some(10.0),
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

    fn context_for(records: Vec<OrderRecord>) -> ToolContext {
        ToolContext {
            dataset: Arc::new(Dataset::from_records(records)),
            forecaster: Arc::new(DemandForecaster::new()),
            optimizer: InventoryOptimizer::new(),
            scorer: SupplierScorer::new(),
            default_horizon_days: 30,
        }
    }

    fn context() -> ToolContext {
        context_for((0..50).map(order).collect())
    }

    #[test]
    fn revenue_questions_route_to_the_query_tool() {
        let ctx = context();
        let router = FallbackRouter::new(&ctx);
        let reply = router.respond("What is the total revenue?", &ctx);
        assert!(reply.contains("Supply Chain Data Summary"));
        assert!(reply.contains("Total Orders"));
        // One calendar month of data: no trend table.
        assert!(!reply.contains("Recent Monthly Trend"));
    }

    #[test]
    fn revenue_answers_include_the_trend_when_data_spans_months() {
        let mut records: Vec<OrderRecord> = (0..50).map(order).collect();
        for r in records.iter_mut().skip(25) {
            r.order_date = NaiveDate::from_ymd_opt(2017, 7, 10)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap();
        }
        let ctx = context_for(records);
        let router = FallbackRouter::new(&ctx);
        let reply = router.respond("what were total sales?", &ctx);
        assert!(reply.contains("Recent Monthly Trend"));
        assert!(reply.contains("| 2017-06 |"));
        assert!(reply.contains("| 2017-07 |"));
    }

    #[test]
    fn department_questions_use_the_dataset_vocabulary() {
        let ctx = context();
        let router = FallbackRouter::new(&ctx);
        let reply = router.respond("analyze the fan shop department", &ctx);
        assert!(reply.contains("Department Analysis: Fan Shop"));
    }

    #[test]
    fn delivery_questions_route_to_risk_prediction() {
        let ctx = context();
        let router = FallbackRouter::new(&ctx);
        let reply = router.respond("what is the late delivery risk?", &ctx);
        assert!(reply.contains("Delivery Risk Prediction"));
    }

    #[test]
    fn unroutable_questions_get_the_help_text() {
        let ctx = context();
        let router = FallbackRouter::new(&ctx);
        let reply = router.respond("tell me a joke", &ctx);
        assert!(reply.contains("I can help you with"));
    }

    #[test]
    fn region_questions_render_the_comparison_table() {
        let ctx = context();
        let router = FallbackRouter::new(&ctx);
        let reply = router.respond("compare market regions", &ctx);
        assert!(reply.contains("| Europe |"));
    }
}
