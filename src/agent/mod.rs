/*!
 * # Supply Chain Agent
 *
 * ReAct-style tool-calling loop over an OpenAI-compatible endpoint, with a
 * deterministic keyword fallback when no API key is configured. The loop is
 * bounded: at most five completion rounds per question, and only the last
 * ten history messages are replayed to the model.
 */

pub mod fallback;
pub mod llm;
pub mod tools;

use crate::config::AppConfig;
use crate::dataset::Dataset;
use crate::ml::forecasting::DemandForecaster;
use crate::ml::inventory::InventoryOptimizer;
use crate::ml::scoring::SupplierScorer;
use fallback::FallbackRouter;
use llm::{ChatMessage, LlmClient};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use tools::ToolContext;

/// History messages replayed to the model per question.
const HISTORY_WINDOW: usize = 10;

fn system_prompt(dataset: &Dataset) -> String {
    format!(
        "You are an expert Supply Chain Intelligence Agent with access to an order \
         dataset of {} orders. You can analyze data, run forecasts, evaluate department \
         performance, check inventory, and predict delivery risks.\n\n\
         Your capabilities:\n\
         1. Data querying: filter and analyze supply chain data by category, market region, department, time period\n\
         2. Demand forecasting: run ML-based demand forecasts for any product category\n\
         3. Department analysis: score and evaluate department performance across multiple dimensions\n\
         4. Inventory optimization: compute EOQ, safety stock, and reorder points from demand data\n\
         5. Delivery risk prediction: predict likelihood of late delivery for specific order parameters\n\
         6. Product analytics: find top-performing products by revenue, orders, or profit\n\
         7. Regional comparison: compare performance across all market regions\n\n\
         Guidelines:\n\
         - Always use available tools to ground your answers in data\n\
         - Provide specific numbers and actionable recommendations\n\
         - When comparing, use relative terms (X% better/worse)\n\
         - Highlight risks and opportunities\n\
         - Format responses clearly with bullet points and sections\n\
         - If asked about something outside your data, say so clearly\n\
         - Be proactive in suggesting related insights\n\n\
         Available product categories: {}\n\n\
         Available market regions: {}\n\n\
         Available shipping modes: {}\n\n\
         Available departments: {}",
        dataset.len(),
        dataset.categories().join(", "),
        dataset.regions().join(", "),
        dataset.shipping_modes().join(", "),
        dataset.departments().join(", "),
    )
}

/// Conversational agent over the analytical engines.
pub struct SupplyChainAgent {
    client: Option<LlmClient>,
    ctx: ToolContext,
    router: FallbackRouter,
    history: Vec<ChatMessage>,
    system_prompt: String,
    max_iterations: usize,
}

impl SupplyChainAgent {
    pub fn new(config: &AppConfig, dataset: Arc<Dataset>) -> Self {
        let client = config.api_key.as_deref().filter(|k| !k.is_empty()).map(|key| {
            LlmClient::new(
                key.to_string(),
                config.base_url.clone(),
                config.model.clone(),
            )
        });
        if client.is_none() {
            info!("no API key configured; using the deterministic fallback router");
        }

        let ctx = ToolContext {
            dataset: Arc::clone(&dataset),
            forecaster: Arc::new(DemandForecaster::new()),
            optimizer: InventoryOptimizer::new(),
            scorer: SupplierScorer::new(),
            default_horizon_days: config.forecast_horizon_days,
        };
        let router = FallbackRouter::new(&ctx);
        let system_prompt = system_prompt(&dataset);

        Self {
            client,
            ctx,
            router,
            history: Vec::new(),
            system_prompt,
            max_iterations: config.max_agent_iterations,
        }
    }

    /// True when an LLM endpoint is configured.
    pub fn is_llm_backed(&self) -> bool {
        self.client.is_some()
    }

    pub fn reset_conversation(&mut self) {
        self.history.clear();
    }

    /// Answer one question. LLM-backed when configured, otherwise routed
    /// deterministically. API failures come back as readable messages, not
    /// errors, so the conversation can continue.
    pub async fn chat(&mut self, question: &str) -> String {
        let Some(client) = self.client.clone() else {
            return self.router.respond(question, &self.ctx);
        };

        self.history.push(ChatMessage::user(question));

        let mut messages = vec![ChatMessage::system(self.system_prompt.clone())];
        let start = self.history.len().saturating_sub(HISTORY_WINDOW);
        messages.extend_from_slice(&self.history[start..]);

        for iteration in 0..self.max_iterations {
            let reply = match client.chat(&messages, tools::definitions()).await {
                Ok(reply) => reply,
                Err(e) => return format!("LLM request failed: {e}"),
            };

            let Some(calls) = reply.tool_calls.clone().filter(|c| !c.is_empty()) else {
                let answer = reply.content.unwrap_or_default();
                self.history.push(ChatMessage::assistant(answer.clone()));
                return answer;
            };

            messages.push(reply);
            for call in calls {
                // Model-produced arguments may be malformed JSON.
                let arguments: Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                        warn!(
                            tool = %call.function.name,
                            iteration,
                            "malformed tool arguments: {e}"
                        );
                        Value::Object(Default::default())
                    });
                let result = tools::execute(&call.function.name, arguments, &self.ctx);
                messages.push(ChatMessage::tool_result(call.id, result.to_string()));
            }
        }

        "Reached maximum reasoning iterations. Please try a simpler question.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::OrderRecord;
    use chrono::NaiveDate;

    fn dataset() -> Arc<Dataset> {
        let records: Vec<OrderRecord> = (0..20)
            .map(|i| OrderRecord {
                order_id: i,
                order_date: NaiveDate::from_ymd_opt(2017, 6, 1 + (i % 20) as u32)
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
                late_delivery: false,
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
            })
            .collect();
        Arc::new(Dataset::from_records(records))
    }

    fn keyless_config() -> AppConfig {
        AppConfig {
            api_key: None,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn without_a_key_the_fallback_answers() {
        let mut agent = SupplyChainAgent::new(&keyless_config(), dataset());
        assert!(!agent.is_llm_backed());
        let reply = agent.chat("total revenue?").await;
        assert!(reply.contains("Supply Chain Data Summary"));
    }

    #[test]
    fn empty_key_counts_as_no_key() {
        let config = AppConfig {
            api_key: Some(String::new()),
            ..AppConfig::default()
        };
        let agent = SupplyChainAgent::new(&config, dataset());
        assert!(!agent.is_llm_backed());
    }

    #[test]
    fn system_prompt_lists_dataset_vocabularies() {
        let prompt = system_prompt(&dataset());
        assert!(prompt.contains("Cleats"));
        assert!(prompt.contains("Europe"));
        assert!(prompt.contains("Fan Shop"));
        assert!(prompt.contains("Standard Class"));
    }

    #[tokio::test]
    async fn reset_clears_history() {
        let mut agent = SupplyChainAgent::new(&keyless_config(), dataset());
        let _ = agent.chat("total orders?").await;
        agent.reset_conversation();
        assert!(agent.history.is_empty());
    }
}
