//! Tool executor.
//!
//! [`ToolExecutor::execute`] runs one tool invocation end to end and always
//! produces a [`ToolCallResult`]. Rate limiting, empty results, provider
//! faults and provider timeouts all end up as narrative content.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, warn};

use super::{CompareArgs, InsightArgs, PriceSearchArgs, RegisteredTool, ToolArguments, TrendArgs};
use crate::error::ProviderError;
use crate::mcp::protocol::ToolCallResult;
use crate::pricing::format::{self, ItemSummary, RegionSummary, SearchContext};
use crate::pricing::query::item_group;
use crate::pricing::{parse_query, PriceProvider, PriceRecord, PriceStatistics, SearchParams};
use crate::ratelimit::RateLimiter;

/// Runs registered tools against a price provider.
#[derive(Clone)]
pub struct ToolExecutor {
    provider: Arc<dyn PriceProvider>,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ToolExecutor {
    /// Creates an executor. `timeout` bounds every provider call.
    #[must_use]
    pub fn new(provider: Arc<dyn PriceProvider>, limiter: Arc<RateLimiter>, timeout: Duration) -> Self {
        Self {
            provider,
            limiter,
            timeout,
        }
    }

    /// Runs `tool` with already-checked `args` on behalf of `client_id`.
    pub async fn execute(
        &self,
        tool: &RegisteredTool,
        args: ToolArguments,
        client_id: &str,
    ) -> ToolCallResult {
        let name = tool.definition.name.as_str();

        if !self.limiter.check_and_consume(client_id) {
            debug!(tool = name, client_id, "Tool call rate limited");
            return format::rate_limited(name, self.limiter.config());
        }

        let outcome = match args {
            ToolArguments::PriceSearch(args) => self.price_search(args).await,
            ToolArguments::PriceComparison(args) => self.compare(args).await,
            ToolArguments::TrendAnalysis(args) => self.trends(args).await,
            ToolArguments::MarketInsights(args) => self.insights(args).await,
        };

        outcome.unwrap_or_else(|error| {
            warn!(tool = name, provider = self.provider.name(), error = %error, "Price provider failed");
            format::service_unavailable(name, &error.to_string())
        })
    }

    async fn fetch(&self, params: &SearchParams) -> Result<Vec<PriceRecord>, ProviderError> {
        tokio::time::timeout(self.timeout, self.provider.search(params))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
    }

    async fn price_search(&self, args: PriceSearchArgs) -> Result<ToolCallResult, ProviderError> {
        let query = args.query.as_deref().map(str::trim).filter(|q| !q.is_empty());
        let inferred = query.map(parse_query).unwrap_or_default();

        let explicit = SearchParams {
            term: None,
            item: args
                .item
                .as_deref()
                .filter(|i| !i.trim().is_empty())
                .map(canonical_item),
            location: args
                .location
                .as_deref()
                .filter(|l| !l.trim().is_empty())
                .map(normalise),
            retailer_type: args.retailer_type,
            min_price: args.min_price,
            max_price: args.max_price,
        };
        let mut params = explicit.or(inferred);
        if params.item.is_none() {
            params.term = query.map(str::to_string);
        }

        let records = self.fetch(&params).await?;
        let ctx = SearchContext {
            query,
            params: &params,
        };
        if records.is_empty() {
            return Ok(format::no_results(&ctx));
        }

        let stats = PriceStatistics::compute(&records);
        let limit = args.limit.unwrap_or(format::MAX_DISPLAYED_RECORDS);
        Ok(format::format_search(&ctx, &records, &stats, limit))
    }

    async fn compare(&self, args: CompareArgs) -> Result<ToolCallResult, ProviderError> {
        let item = canonical_item(&args.item);
        let lookups = args.regions.iter().map(|region| {
            let params = SearchParams {
                item: Some(item.clone()),
                location: Some(normalise(region)),
                retailer_type: args.retailer_type,
                ..SearchParams::default()
            };
            async move { self.fetch(&params).await }
        });
        let per_region = try_join_all(lookups).await?;

        if per_region.iter().all(Vec::is_empty) {
            let params = SearchParams {
                item: Some(item),
                retailer_type: args.retailer_type,
                ..SearchParams::default()
            };
            return Ok(format::no_results(&SearchContext {
                query: None,
                params: &params,
            }));
        }

        let summaries: Vec<RegionSummary> = args
            .regions
            .iter()
            .zip(per_region)
            .map(|(region, records)| RegionSummary {
                region: region.trim().to_string(),
                stats: PriceStatistics::compute(&records),
                cheapest: records
                    .into_iter()
                    .filter(|r| r.price > 0.0)
                    .min_by(|a, b| a.price.total_cmp(&b.price)),
            })
            .collect();

        Ok(format::format_comparison(args.item.trim(), &summaries))
    }

    async fn trends(&self, args: TrendArgs) -> Result<ToolCallResult, ProviderError> {
        let location = args.location.as_deref().map(normalise);
        let lookups = args.items.iter().map(|item| {
            let params = SearchParams {
                item: Some(canonical_item(item)),
                location: location.clone(),
                ..SearchParams::default()
            };
            async move { self.fetch(&params).await }
        });
        let per_item = try_join_all(lookups).await?;

        if per_item.iter().all(Vec::is_empty) {
            let params = SearchParams {
                term: Some(args.items.join(", ")),
                location,
                ..SearchParams::default()
            };
            return Ok(format::no_results(&SearchContext {
                query: None,
                params: &params,
            }));
        }

        let summaries: Vec<ItemSummary> = args
            .items
            .iter()
            .zip(per_item)
            .map(|(item, records)| ItemSummary {
                item: item.trim().to_string(),
                stats: PriceStatistics::compute(&records),
            })
            .collect();

        Ok(format::format_trends(
            args.period.label(),
            args.location.as_deref().map(str::trim),
            &summaries,
        ))
    }

    async fn insights(&self, args: InsightArgs) -> Result<ToolCallResult, ProviderError> {
        let params = SearchParams {
            item: args
                .category
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .map(canonical_item),
            location: args
                .location
                .as_deref()
                .filter(|l| !l.trim().is_empty())
                .map(normalise),
            ..SearchParams::default()
        };

        let records = self.fetch(&params).await?;
        if records.is_empty() {
            return Ok(format::no_results(&SearchContext {
                query: None,
                params: &params,
            }));
        }

        let stats = PriceStatistics::compute(&records);
        Ok(format::format_insights(&params.describe(), &records, &stats))
    }
}

/// Maps any synonym to its group keyword; unknown items pass through lower-cased.
fn canonical_item(item: &str) -> String {
    item_group(item).map_or_else(|| normalise(item), |group| group.keyword.to_string())
}

fn normalise(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::config::RateLimitConfig;
    use crate::pricing::SampleProvider;
    use crate::tools::ToolRegistry;

    struct FailingProvider;

    #[async_trait]
    impl PriceProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn search(&self, _: &SearchParams) -> Result<Vec<PriceRecord>, ProviderError> {
            Err(ProviderError::Unavailable("connection refused".to_string()))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl PriceProvider for SlowProvider {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn search(&self, _: &SearchParams) -> Result<Vec<PriceRecord>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingProvider {
        calls: AtomicUsize,
        last: parking_lot::Mutex<Option<SearchParams>>,
    }

    #[async_trait]
    impl PriceProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn search(&self, params: &SearchParams) -> Result<Vec<PriceRecord>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = Some(params.clone());
            Ok(Vec::new())
        }
    }

    fn executor_with(provider: Arc<dyn PriceProvider>, per_minute: u32) -> ToolExecutor {
        let limiter = RateLimiter::new(RateLimitConfig {
            per_minute,
            per_hour: 100,
            max_clients: 100,
        });
        ToolExecutor::new(provider, Arc::new(limiter), Duration::from_millis(50))
    }

    async fn run(executor: &ToolExecutor, tool: &str, args: serde_json::Value) -> String {
        let registry = ToolRegistry::builtin();
        let tool = registry.get(tool).unwrap();
        let args = tool.kind.parse_arguments(&args).unwrap();
        executor.execute(tool, args, "test").await.joined_text()
    }

    #[tokio::test]
    async fn search_reports_statistics() {
        let executor = executor_with(Arc::new(SampleProvider::new()), 10);
        let text = run(&executor, "get_malaysian_prices", json!({ "query": "ayam in selangor" })).await;
        assert!(text.contains("- Records: 3"), "{text}");
        assert!(text.contains("location: selangor"));
    }

    #[tokio::test]
    async fn explicit_fields_override_query() {
        let provider = Arc::new(RecordingProvider::default());
        let executor = executor_with(provider.clone(), 10);
        run(
            &executor,
            "get_malaysian_prices",
            json!({ "query": "ayam in johor under rm10", "location": "Selangor", "item": "rice" }),
        )
        .await;

        let params = provider.last.lock().clone().unwrap();
        assert_eq!(params.item.as_deref(), Some("beras"));
        assert_eq!(params.location.as_deref(), Some("selangor"));
        assert_eq!(params.max_price, Some(10.0));
        assert!(params.term.is_none());
    }

    #[tokio::test]
    async fn blank_explicit_fields_keep_inferred_values() {
        let executor = executor_with(Arc::new(SampleProvider::new()), 10);
        let text = run(
            &executor,
            "get_malaysian_prices",
            json!({ "query": "ayam in selangor", "item": "", "location": "  " }),
        )
        .await;
        assert!(text.contains("- Records: 3"), "{text}");
        assert!(text.contains("location: selangor"));
    }

    #[tokio::test]
    async fn unrecognised_query_travels_as_term() {
        let provider = Arc::new(RecordingProvider::default());
        let executor = executor_with(provider.clone(), 10);
        let text = run(&executor, "get_malaysian_prices", json!({ "query": "durian musang king" })).await;

        let params = provider.last.lock().clone().unwrap();
        assert_eq!(params.term.as_deref(), Some("durian musang king"));
        assert!(text.contains("No prices found"));
    }

    #[tokio::test]
    async fn provider_fault_becomes_content() {
        let executor = executor_with(Arc::new(FailingProvider), 10);
        let text = run(&executor, "get_malaysian_prices", json!({ "item": "ayam" })).await;
        assert!(text.contains("unavailable"));
        assert!(text.contains("connection refused"));
    }

    #[tokio::test]
    async fn provider_timeout_becomes_content() {
        let executor = executor_with(Arc::new(SlowProvider), 10);
        let text = run(&executor, "get_market_insights", json!({})).await;
        assert!(text.contains("did not respond within 50 ms"), "{text}");
    }

    #[tokio::test]
    async fn rate_limit_short_circuits_provider() {
        let provider = Arc::new(RecordingProvider::default());
        let executor = executor_with(provider.clone(), 1);

        run(&executor, "get_market_insights", json!({})).await;
        let text = run(&executor, "get_market_insights", json!({})).await;

        assert!(text.contains("Rate limit reached"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compare_queries_each_region_once() {
        let provider = Arc::new(RecordingProvider::default());
        let executor = executor_with(provider.clone(), 10);
        run(
            &executor,
            "compare_prices",
            json!({ "item": "chicken", "regions": ["Johor", "Selangor", "Pahang"] }),
        )
        .await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn compare_ranks_sample_regions() {
        let executor = executor_with(Arc::new(SampleProvider::new()), 10);
        let text = run(
            &executor,
            "compare_prices",
            json!({ "item": "ayam", "regions": ["Selangor", "Johor"] }),
        )
        .await;
        assert!(text.contains("## Price comparison: ayam"));
        assert!(text.contains("| Johor | 2 |"), "{text}");
        assert!(text.contains("| Selangor | 3 |"));
    }

    #[tokio::test]
    async fn trends_cover_every_item() {
        let executor = executor_with(Arc::new(SampleProvider::new()), 10);
        let text = run(
            &executor,
            "analyze_price_trends",
            json!({ "items": ["beras", "durian"], "period": "week" }),
        )
        .await;
        assert!(text.contains("past week"));
        assert!(text.contains("### beras"));
        assert!(text.contains("### durian\nNo current observations."));
    }

    #[tokio::test]
    async fn insights_for_category() {
        let executor = executor_with(Arc::new(SampleProvider::new()), 10);
        let text = run(&executor, "get_market_insights", json!({ "category": "gula" })).await;
        assert!(text.contains("## Market insights: item: gula"));
        assert!(text.contains("- Records: 2"));
    }

    #[test]
    fn synonyms_canonicalise() {
        assert_eq!(canonical_item("Chicken"), "ayam");
        assert_eq!(canonical_item(" Durian "), "durian");
    }
}
