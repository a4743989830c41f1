//! Tool registry.
//!
//! Each tool is one record: its advertised definition plus the [`ToolKind`]
//! the executor runs for it. The dispatcher never branches on tool names.

pub mod executor;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::pricing::RetailerType;

pub use executor::ToolExecutor;

/// A tool definition for the tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// What a registered tool does when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Free-text or structured price lookup.
    PriceSearch,
    /// One item across several regions.
    PriceComparison,
    /// Spread summary across several items.
    TrendAnalysis,
    /// Category/location overview.
    MarketInsights,
}

impl ToolKind {
    /// Parses and checks raw `arguments` for this kind of tool.
    ///
    /// A missing or `null` argument object is treated as `{}`.
    ///
    /// # Errors
    ///
    /// Returns a message suitable for an Invalid Params reply when the
    /// arguments do not match the tool's schema.
    pub fn parse_arguments(self, raw: &Value) -> Result<ToolArguments, String> {
        let args = match self {
            Self::PriceSearch => ToolArguments::PriceSearch(decode(raw)?),
            Self::PriceComparison => ToolArguments::PriceComparison(decode(raw)?),
            Self::TrendAnalysis => ToolArguments::TrendAnalysis(decode(raw)?),
            Self::MarketInsights => ToolArguments::MarketInsights(decode(raw)?),
        };
        args.check()?;
        Ok(args)
    }
}

fn decode<T: DeserializeOwned>(raw: &Value) -> Result<T, String> {
    let raw = if raw.is_null() { json!({}) } else { raw.clone() };
    if !raw.is_object() {
        return Err("arguments must be an object".to_string());
    }
    serde_json::from_value(raw).map_err(|e| e.to_string())
}

/// Arguments of `get_malaysian_prices`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceSearchArgs {
    /// Natural-language query.
    #[serde(default)]
    pub query: Option<String>,
    /// Item keyword.
    #[serde(default)]
    pub item: Option<String>,
    /// State or district.
    #[serde(default)]
    pub location: Option<String>,
    /// Outlet category.
    #[serde(default)]
    pub retailer_type: Option<RetailerType>,
    /// Inclusive lower price bound.
    #[serde(default)]
    pub min_price: Option<f64>,
    /// Inclusive upper price bound.
    #[serde(default)]
    pub max_price: Option<f64>,
    /// Records to list, capped by the formatter.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Arguments of `compare_prices`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompareArgs {
    /// Item to compare.
    pub item: String,
    /// Regions to compare across.
    pub regions: Vec<String>,
    /// Outlet category.
    #[serde(default)]
    pub retailer_type: Option<RetailerType>,
}

/// Time span a trend report is labelled with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendPeriod {
    /// Last 7 days.
    Week,
    /// Last 30 days.
    #[default]
    Month,
    /// Last 90 days.
    Quarter,
    /// Last 365 days.
    Year,
}

impl TrendPeriod {
    /// Wire names, in schema order.
    pub const NAMES: [&'static str; 4] = ["week", "month", "quarter", "year"];

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Week => "past week",
            Self::Month => "past month",
            Self::Quarter => "past quarter",
            Self::Year => "past year",
        }
    }
}

/// Arguments of `analyze_price_trends`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrendArgs {
    /// Items to analyse.
    pub items: Vec<String>,
    /// State or district.
    #[serde(default)]
    pub location: Option<String>,
    /// Reporting period.
    #[serde(default)]
    pub period: TrendPeriod,
}

/// Arguments of `get_market_insights`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InsightArgs {
    /// Item category keyword.
    #[serde(default)]
    pub category: Option<String>,
    /// State or district.
    #[serde(default)]
    pub location: Option<String>,
}

/// Checked arguments for one tool invocation.
#[derive(Debug, Clone)]
pub enum ToolArguments {
    /// `get_malaysian_prices`.
    PriceSearch(PriceSearchArgs),
    /// `compare_prices`.
    PriceComparison(CompareArgs),
    /// `analyze_price_trends`.
    TrendAnalysis(TrendArgs),
    /// `get_market_insights`.
    MarketInsights(InsightArgs),
}

impl ToolArguments {
    fn check(&self) -> Result<(), String> {
        match self {
            Self::PriceSearch(args) => {
                check_retailer(args.retailer_type)?;
                for (name, bound) in [("min_price", args.min_price), ("max_price", args.max_price)] {
                    if bound.is_some_and(|v| !v.is_finite() || v < 0.0) {
                        return Err(format!("{name} must be a non-negative number"));
                    }
                }
                if let (Some(min), Some(max)) = (args.min_price, args.max_price) {
                    if min > max {
                        return Err("min_price must not exceed max_price".to_string());
                    }
                }
                if args.limit == Some(0) {
                    return Err("limit must be at least 1".to_string());
                }
                Ok(())
            }
            Self::PriceComparison(args) => {
                check_retailer(args.retailer_type)?;
                if args.item.trim().is_empty() {
                    return Err("item must not be empty".to_string());
                }
                check_list("regions", &args.regions)
            }
            Self::TrendAnalysis(args) => check_list("items", &args.items),
            Self::MarketInsights(_) => Ok(()),
        }
    }
}

fn check_retailer(retailer: Option<RetailerType>) -> Result<(), String> {
    if retailer == Some(RetailerType::Other) {
        return Err(format!(
            "retailer_type must be one of: {}",
            RetailerType::FILTERABLE.map(RetailerType::as_str).join(", ")
        ));
    }
    Ok(())
}

fn check_list(name: &str, values: &[String]) -> Result<(), String> {
    if values.is_empty() {
        return Err(format!("{name} must contain at least one entry"));
    }
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(format!("{name} must not contain empty entries"));
    }
    Ok(())
}

/// One entry of the registry.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    /// What tools/list advertises.
    pub definition: ToolDefinition,
    /// What the executor runs.
    pub kind: ToolKind,
}

/// Read-only catalogue of the tools this server offers, in listing order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the four price tools.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (definition, kind) in builtin_tools() {
            registry.register(definition, kind);
        }
        registry
    }

    /// Adds a tool, replacing any existing tool of the same name.
    pub fn register(&mut self, definition: ToolDefinition, kind: ToolKind) {
        self.tools
            .insert(definition.name.clone(), RegisteredTool { definition, kind });
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Definitions of every tool, in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values().map(|tool| &tool.definition)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` when no tool is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn retailer_prop() -> Value {
    json!({
        "type": "string",
        "enum": RetailerType::FILTERABLE.map(RetailerType::as_str),
        "description": "Outlet category to restrict results to"
    })
}

#[allow(clippy::too_many_lines)]
fn builtin_tools() -> Vec<(ToolDefinition, ToolKind)> {
    vec![
        (
            ToolDefinition {
                name: "get_malaysian_prices".to_string(),
                description: "Search current retail prices of essential goods in Malaysia. \
                              Accepts a natural-language query in English or Malay \
                              (e.g. \"cheapest ayam in Selangor under RM10\") and/or \
                              structured filters. Explicit filters take precedence over \
                              anything inferred from the query. Prices are in ringgit (RM)."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": string_prop("Natural-language query, English or Malay"),
                        "item": string_prop("Item keyword, e.g. ayam, beras, minyak masak"),
                        "location": string_prop("Malaysian state or district"),
                        "retailer_type": retailer_prop(),
                        "min_price": {
                            "type": "number",
                            "minimum": 0,
                            "description": "Lowest price in RM (inclusive)"
                        },
                        "max_price": {
                            "type": "number",
                            "minimum": 0,
                            "description": "Highest price in RM (inclusive)"
                        },
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": crate::pricing::format::MAX_DISPLAYED_RECORDS,
                            "description": "Number of records to list (at most 10)"
                        }
                    }
                }),
            },
            ToolKind::PriceSearch,
        ),
        (
            ToolDefinition {
                name: "compare_prices".to_string(),
                description: "Compare the price of one item across several Malaysian states \
                              or districts, ranking regions by average price."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "item": string_prop("Item keyword to compare, e.g. ayam"),
                        "regions": {
                            "type": "array",
                            "items": { "type": "string" },
                            "minItems": 1,
                            "description": "States or districts to compare"
                        },
                        "retailer_type": retailer_prop()
                    },
                    "required": ["item", "regions"]
                }),
            },
            ToolKind::PriceComparison,
        ),
        (
            ToolDefinition {
                name: "analyze_price_trends".to_string(),
                description: "Summarise how prices of one or more items vary across outlets. \
                              Based on the latest observations; historical series are not \
                              available from the price source."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "items": {
                            "type": "array",
                            "items": { "type": "string" },
                            "minItems": 1,
                            "description": "Item keywords to analyse"
                        },
                        "location": string_prop("Malaysian state or district"),
                        "period": {
                            "type": "string",
                            "enum": TrendPeriod::NAMES,
                            "default": "month",
                            "description": "Reporting period label"
                        }
                    },
                    "required": ["items"]
                }),
            },
            ToolKind::TrendAnalysis,
        ),
        (
            ToolDefinition {
                name: "get_market_insights".to_string(),
                description: "Overview of a product category or location: price statistics, \
                              average price by outlet type, and the best buys currently observed."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "category": string_prop("Item category keyword, e.g. beras"),
                        "location": string_prop("Malaysian state or district")
                    }
                }),
            },
            ToolKind::MarketInsights,
        ),
    ]
}
