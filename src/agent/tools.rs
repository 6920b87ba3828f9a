/*!
 * # Agent Tools
 *
 * The seven callable tools exposed to the LLM, plus the executor that
 * routes calls to the analytical engines. Tool execution never panics:
 * unknown tools, bad arguments, and engine failures all come back as a
 * JSON object with an `error` key so the model can recover.
 */

use crate::dataset::{Dataset, OrderFilter, OrderRecord, TimePeriod};
use crate::errors::ServiceError;
use crate::ml::forecasting::DemandForecaster;
use crate::ml::inventory::InventoryOptimizer;
use crate::ml::scoring::SupplierScorer;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Shared engine handles passed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub dataset: Arc<Dataset>,
    pub forecaster: Arc<DemandForecaster>,
    pub optimizer: InventoryOptimizer,
    pub scorer: SupplierScorer,
    /// Forecast horizon used when a call omits `horizon_days`.
    pub default_horizon_days: u32,
}

/// OpenAI-style function definitions advertised to the model.
pub fn definitions() -> &'static [Value] {
    static DEFS: Lazy<Vec<Value>> = Lazy::new(|| {
        vec![
            json!({
                "type": "function",
                "function": {
                    "name": "query_supply_chain_data",
                    "description": "Query the supply chain dataset. Can filter by date range, category, region, or shipping mode. Returns summary statistics of the filtered data.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "category": {"type": "string", "description": "Product category to filter by"},
                            "region": {"type": "string", "description": "Market region to filter by (Africa, Europe, LATAM, Pacific Asia, USCA)"},
                            "department": {"type": "string", "description": "Department to filter by"},
                            "metric": {"type": "string", "description": "Specific metric to retrieve: revenue, orders, profit, late_delivery_rate, avg_shipping_days"},
                            "time_period": {"type": "string", "description": "Time period: 'last_month', 'last_quarter', 'last_year', 'all'"}
                        }
                    }
                }
            }),
            json!({
                "type": "function",
                "function": {
                    "name": "run_demand_forecast",
                    "description": "Run demand forecasting for a specific product category. Returns predicted demand for the next N days.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "category": {"type": "string", "description": "Product category to forecast"},
                            "horizon_days": {"type": "integer", "description": "Number of days to forecast (default: 30)"}
                        }
                    }
                }
            }),
            json!({
                "type": "function",
                "function": {
                    "name": "analyze_supplier",
                    "description": "Get detailed analysis of a department's performance including delivery, profitability, reliability, and risk scores. In this dataset, departments act as supply units.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "supplier_name": {"type": "string", "description": "Name of the department to analyze (e.g. Fan Shop, Apparel, Golf, Technology)"}
                        },
                        "required": ["supplier_name"]
                    }
                }
            }),
            json!({
                "type": "function",
                "function": {
                    "name": "check_inventory_status",
                    "description": "Check inventory optimization metrics for a product category including EOQ, safety stock, and demand analysis.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "category": {"type": "string", "description": "Product category to check inventory for"}
                        }
                    }
                }
            }),
            json!({
                "type": "function",
                "function": {
                    "name": "predict_delivery_risk",
                    "description": "Predict the risk of late delivery for specific order parameters.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "category": {"type": "string", "description": "Product category"},
                            "region": {"type": "string", "description": "Market region"},
                            "shipping_mode": {"type": "string", "description": "Shipping mode (Standard Class, Second Class, First Class, Same Day)"},
                            "quantity": {"type": "integer", "description": "Order quantity"}
                        }
                    }
                }
            }),
            json!({
                "type": "function",
                "function": {
                    "name": "get_top_products",
                    "description": "Get the top performing products by revenue, orders, or profit.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "metric": {"type": "string", "description": "Metric to rank by: 'revenue', 'orders', 'profit'"},
                            "top_n": {"type": "integer", "description": "Number of top products (default: 10)"}
                        }
                    }
                }
            }),
            json!({
                "type": "function",
                "function": {
                    "name": "compare_regions",
                    "description": "Compare performance metrics across all market regions.",
                    "parameters": {"type": "object", "properties": {}}
                }
            }),
        ]
    });
    &DEFS
}

/// Route one tool call. Every failure path collapses into an `error` key.
pub fn execute(name: &str, arguments: Value, ctx: &ToolContext) -> Value {
    let result = match name {
        "query_supply_chain_data" => query_data(parse(arguments), ctx),
        "run_demand_forecast" => run_forecast(parse(arguments), ctx),
        "analyze_supplier" => analyze_supplier(parse(arguments), ctx),
        "check_inventory_status" => check_inventory(parse(arguments), ctx),
        "predict_delivery_risk" => predict_delivery(parse(arguments), ctx),
        "get_top_products" => top_products(parse(arguments), ctx),
        "compare_regions" => compare_regions(ctx),
        _ => {
            warn!(tool = name, "unknown tool requested");
            return json!({"error": format!("Unknown tool: {name}")});
        }
    };
    result.unwrap_or_else(|e| json!({"error": e.to_string()}))
}

fn parse<T: Default + DeserializeOwned>(arguments: Value) -> T {
    serde_json::from_value(arguments).unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QueryArgs {
    category: Option<String>,
    region: Option<String>,
    department: Option<String>,
    metric: Option<String>,
    time_period: Option<String>,
}

fn query_data(args: QueryArgs, ctx: &ToolContext) -> Result<Value, ServiceError> {
    let filter = OrderFilter {
        category: args.category,
        region: args.region,
        department: args.department,
        time_period: TimePeriod::parse(args.time_period.as_deref().unwrap_or("all")),
    };
    let data = ctx.dataset.select(&filter);
    if data.is_empty() {
        return Ok(json!({"message": "No data found matching the filters."}));
    }

    let kpi = Dataset::kpis_over(&data);
    let late_rate = 1.0 - kpi.on_time_rate / 100.0;
    let first = data.iter().map(|r| r.order_date.date()).min();
    let last = data.iter().map(|r| r.order_date.date()).max();

    let mut summary = json!({
        "total_orders": kpi.total_orders,
        "total_revenue": money(kpi.total_revenue),
        "total_profit": money(kpi.total_profit),
        "avg_order_value": money(kpi.avg_order_value),
        "late_delivery_rate": format!("{:.1}%", late_rate * 100.0),
        "avg_shipping_days": format!("{:.1}", kpi.avg_shipping_days),
        "top_category": mode_of(&data, |r| r.product_category.as_str()),
        "top_region": mode_of(&data, |r| r.region.as_str()),
        "date_range": match (first, last) {
            (Some(a), Some(b)) => format!("{a} to {b}"),
            _ => String::new(),
        },
    });

    if let Some(metric) = args.metric.as_deref() {
        let value = match metric {
            "revenue" => Some(group_thousands(kpi.total_revenue, 2)),
            "orders" => Some(kpi.total_orders.to_string()),
            "profit" => Some(group_thousands(kpi.total_profit, 2)),
            "late_delivery_rate" => Some(format!("{late_rate:.2}")),
            "avg_shipping_days" => Some(format!("{:.2}", kpi.avg_shipping_days)),
            _ => None,
        };
        if let Some(value) = value {
            summary["requested_metric"] = json!({"metric": metric, "value": value});
        }
    }

    Ok(summary)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ForecastArgs {
    category: Option<String>,
    horizon_days: Option<u32>,
}

fn run_forecast(args: ForecastArgs, ctx: &ToolContext) -> Result<Value, ServiceError> {
    let horizon = args.horizon_days.unwrap_or(ctx.default_horizon_days);
    let category = args
        .category
        .as_deref()
        .map(|c| resolve_entity(&ctx.dataset.categories(), c).unwrap_or_else(|| c.to_string()));

    let training = ctx.forecaster.train(&ctx.dataset, category.as_deref())?;
    let forecast = ctx
        .forecaster
        .forecast_future(&ctx.dataset, horizon, category.as_deref())?;

    let total: f64 = forecast.iter().map(|p| p.predicted_demand).sum();
    let avg = total / forecast.len().max(1) as f64;
    let peak = forecast
        .iter()
        .max_by(|a, b| a.predicted_demand.total_cmp(&b.predicted_demand));

    Ok(json!({
        "category": category.as_deref().unwrap_or("All Categories"),
        "forecast_horizon": format!("{horizon} days"),
        "model_metrics": {
            "MAE": format!("{:.1}", training.metrics.mae),
            "RMSE": format!("{:.1}", training.metrics.rmse),
            "R2": format!("{:.3}", training.metrics.r2),
        },
        "forecast_summary": {
            "avg_predicted_daily_demand": format!("{avg:.0} units"),
            "peak_demand_date": peak.map(|p| p.date.to_string()).unwrap_or_default(),
            "peak_demand_value": format!("{:.0} units", peak.map_or(0.0, |p| p.predicted_demand)),
            "total_predicted_demand": format!("{} units", group_thousands(total, 0)),
        },
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SupplierArgs {
    supplier_name: Option<String>,
}

fn analyze_supplier(args: SupplierArgs, ctx: &ToolContext) -> Result<Value, ServiceError> {
    let Some(name) = args.supplier_name.filter(|n| !n.is_empty()) else {
        return Ok(json!({"error": "supplier_name is required"}));
    };

    let scored = ctx.scorer.score_suppliers(&ctx.dataset);
    let Some(s) = scored
        .iter()
        .find(|s| s.supplier.to_lowercase().contains(&name.to_lowercase()))
    else {
        let available: Vec<&str> = scored.iter().map(|s| s.supplier.as_str()).collect();
        return Ok(json!({
            "error": format!("Department '{name}' not found."),
            "available_suppliers": available,
        }));
    };

    Ok(json!({
        "supplier": s.supplier,
        "overall_score": format!("{:.2}", s.overall_score),
        "grade": s.grade.as_str(),
        "risk_level": s.risk_level.as_str(),
        "metrics": {
            "delivery_performance": pct(s.dimensions.delivery_performance),
            "profitability": pct(s.dimensions.profitability),
            "volume_capability": pct(s.dimensions.volume_capability),
            "order_reliability": pct(s.dimensions.order_reliability),
            "cost_efficiency": pct(s.dimensions.cost_efficiency),
            "product_diversity": pct(s.dimensions.product_diversity),
        },
        "stats": {
            "total_orders": s.total_orders,
            "total_revenue": money(s.total_revenue),
            "avg_shipping_days": format!("{:.1} days", s.avg_shipping_days),
            "late_delivery_rate": pct(s.late_delivery_rate),
        },
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InventoryArgs {
    category: Option<String>,
}

fn check_inventory(args: InventoryArgs, ctx: &ToolContext) -> Result<Value, ServiceError> {
    let analysis = ctx.optimizer.analyze_inventory(&ctx.dataset);

    if let Some(name) = args.category.filter(|c| !c.is_empty()) {
        let Some(row) = analysis
            .iter()
            .find(|r| r.category.to_lowercase().contains(&name.to_lowercase()))
        else {
            return Ok(json!({"error": format!("Category '{name}' not found.")}));
        };
        let recs = ctx.optimizer.get_recommendations(std::slice::from_ref(row));
        let actions: Vec<&str> = recs.iter().map(|r| r.action.as_str()).collect();
        return Ok(json!({
            "category": row.category,
            "avg_daily_demand": format!("{:.1} units", row.avg_daily_demand),
            "demand_variability": format!("{:.1}% CV", row.demand_cv),
            "annual_demand": format!("{} units", group_thousands(row.annual_demand, 0)),
            "optimal_safety_stock_95": format!("{:.0} units", row.safety_stock_95),
            "optimal_safety_stock_99": format!("{:.0} units", row.safety_stock_99),
            "eoq": format!("{:.0} units", row.eoq),
            "reorder_point": format!("{:.0} units", row.reorder_point_95),
            "late_delivery_rate": format!("{:.1}%", row.late_delivery_rate),
            "recommendations": actions,
        }));
    }

    let categories: Vec<Value> = analysis
        .iter()
        .map(|row| {
            json!({
                "name": row.category,
                "eoq": format!("{:.0}", row.eoq),
                "safety_stock": format!("{:.0}", row.safety_stock_95),
                "daily_demand": format!("{:.1}", row.avg_daily_demand),
                "late_rate": format!("{:.1}%", row.late_delivery_rate),
            })
        })
        .collect();
    Ok(json!({"total_categories": analysis.len(), "categories": categories}))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeliveryArgs {
    category: Option<String>,
    region: Option<String>,
    shipping_mode: Option<String>,
    quantity: Option<i64>,
}

fn predict_delivery(args: DeliveryArgs, ctx: &ToolContext) -> Result<Value, ServiceError> {
    let mut data: Vec<&OrderRecord> = ctx.dataset.records().iter().collect();
    if data.is_empty() {
        return Ok(json!({"error": "No order data available."}));
    }

    // Each filter only narrows when it still leaves matching orders, so a
    // bad value degrades to broader history instead of an empty estimate.
    fn narrow<'a, F>(data: &mut Vec<&'a OrderRecord>, keep: F)
    where
        F: Fn(&OrderRecord) -> bool,
    {
        let narrowed: Vec<&'a OrderRecord> = data.iter().copied().filter(|r| keep(r)).collect();
        if !narrowed.is_empty() {
            *data = narrowed;
        }
    }
    if let Some(c) = args.category.as_deref() {
        let c = c.to_lowercase();
        narrow(&mut data, |r| r.product_category.to_lowercase().contains(&c));
    }
    if let Some(x) = args.region.as_deref() {
        let x = x.to_lowercase();
        narrow(&mut data, |r| r.region.to_lowercase().contains(&x));
    }
    if let Some(m) = args.shipping_mode.as_deref() {
        let m = m.to_lowercase();
        narrow(&mut data, |r| r.shipping_mode.to_lowercase().contains(&m));
    }

    let n = data.len() as f64;
    let late_rate = data.iter().filter(|r| r.late_delivery).count() as f64 / n;
    let avg_delay = data.iter().map(|r| r.delivery_delay_days).sum::<f64>() / n;
    let risk_level = if late_rate > 0.5 {
        "High"
    } else if late_rate > 0.3 {
        "Medium"
    } else {
        "Low"
    };

    Ok(json!({
        "parameters": {
            "category": args.category.as_deref().unwrap_or("All"),
            "region": args.region.as_deref().unwrap_or("All"),
            "shipping_mode": args.shipping_mode.as_deref().unwrap_or("All"),
            "quantity": args.quantity.map_or("Any".to_string(), |q| q.to_string()),
        },
        "prediction": {
            "late_delivery_probability": format!("{:.1}%", late_rate * 100.0),
            "risk_level": risk_level,
            "avg_delay_if_late": format!("{avg_delay:.1} days"),
            "matching_orders": data.len(),
        },
        "recommendation": match risk_level {
            "High" => "Consider using Same Day or First Class shipping.",
            "Low" => "Standard delivery should be acceptable.",
            _ => "Monitor closely; consider faster shipping if timeline is critical.",
        },
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TopProductsArgs {
    metric: Option<String>,
    top_n: Option<usize>,
}

fn top_products(args: TopProductsArgs, ctx: &ToolContext) -> Result<Value, ServiceError> {
    let metric = args.metric.as_deref().unwrap_or("revenue");
    let top_n = args.top_n.unwrap_or(10);

    struct Acc {
        value: f64,
        price_sum: f64,
        orders: usize,
    }
    let mut groups: BTreeMap<(String, String), Acc> = BTreeMap::new();
    for r in ctx.dataset.records() {
        let acc = groups
            .entry((r.product_category.clone(), r.product_name.clone()))
            .or_insert(Acc { value: 0.0, price_sum: 0.0, orders: 0 });
        acc.value += match metric {
            "orders" => 1.0,
            "profit" => r.profit.unwrap_or(0.0),
            _ => r.revenue,
        };
        acc.price_sum += r.unit_price;
        acc.orders += 1;
    }

    let mut ranked: Vec<((String, String), Acc)> = groups.into_iter().collect();
    ranked.sort_by(|a, b| b.1.value.total_cmp(&a.1.value));
    ranked.truncate(top_n);

    let rows: Vec<Value> = ranked
        .iter()
        .enumerate()
        .map(|(i, ((category, product), acc))| {
            json!({
                "rank": i + 1,
                "category": category,
                "product": product,
                "value": if metric == "orders" {
                    json!(acc.value as u64)
                } else {
                    json!(money(acc.value))
                },
                "avg_price": money(acc.price_sum / acc.orders as f64),
            })
        })
        .collect();

    Ok(json!({"metric": metric, "top_products": rows}))
}

fn compare_regions(ctx: &ToolContext) -> Result<Value, ServiceError> {
    struct Acc {
        orders: usize,
        revenue: f64,
        profit: f64,
        shipping: f64,
        late: usize,
    }
    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
    for r in ctx.dataset.records() {
        let acc = groups.entry(r.region.clone()).or_insert(Acc {
            orders: 0,
            revenue: 0.0,
            profit: 0.0,
            shipping: 0.0,
            late: 0,
        });
        acc.orders += 1;
        acc.revenue += r.revenue;
        acc.profit += r.profit.unwrap_or(0.0);
        acc.shipping += r.actual_shipping_days;
        acc.late += usize::from(r.late_delivery);
    }

    let regions: Vec<Value> = groups
        .iter()
        .map(|(region, a)| {
            let n = a.orders as f64;
            json!({
                "region": region,
                "orders": a.orders,
                "revenue": money(a.revenue),
                "profit": money(a.profit),
                "avg_delivery_days": format!("{:.1}", a.shipping / n),
                "late_delivery_rate": format!("{:.1}%", a.late as f64 / n * 100.0),
                "avg_order_value": money(a.revenue / n),
            })
        })
        .collect();
    Ok(json!({"regions": regions}))
}

/// First known value containing the fragment, case-insensitively.
pub fn resolve_entity(known: &[String], fragment: &str) -> Option<String> {
    let needle = fragment.to_lowercase();
    known
        .iter()
        .find(|k| k.to_lowercase().contains(&needle))
        .cloned()
}

fn mode_of<'a, F>(data: &[&'a OrderRecord], key: F) -> String
where
    F: Fn(&'a OrderRecord) -> &'a str,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in data {
        *counts.entry(key(r)).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(k, _)| k.to_string())
        .unwrap_or_default()
}

/// `"$1,234.56"` money formatting.
pub fn money(value: f64) -> String {
    format!("${}", group_thousands(value, 2))
}

/// Thousands-separated decimal with a fixed number of fraction digits.
pub fn group_thousands(value: f64, decimals: u32) -> String {
    let scale = 10u64.pow(decimals) as f64;
    let scaled = (value.abs() * scale).round() as u128;
    let whole = scaled / scale as u128;
    let frac = scaled % scale as u128;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && scaled > 0 { "-" } else { "" };
    if decimals == 0 {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{frac:0width$}", width = decimals as usize)
    }
}

fn pct(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}
