//! Rendering of tool results into MCP text content.
//!
//! Every tool invocation ends in exactly one of four shapes:
//!
//! 1. populated results with statistics (at most [`MAX_DISPLAYED_RECORDS`] listed)
//! 2. "no results" guidance listing searchable categories
//! 3. "service unavailable" fallback embedding the fault text
//! 4. "rate limited" notice
//!
//! Output is deterministic for identical inputs apart from the trailing
//! retrieval timestamp.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::Utc;

use super::query::ITEM_GROUPS;
use super::stats::PriceStatistics;
use super::{PriceRecord, RetailerType, SearchParams};
use crate::config::RateLimitConfig;
use crate::mcp::protocol::ToolCallResult;

/// Most records listed in a single reply, regardless of how many matched.
pub const MAX_DISPLAYED_RECORDS: usize = 10;

/// Marker that begins the timestamp footer of every populated reply.
pub const TIMESTAMP_PREFIX: &str = "_Retrieved ";

/// What the caller asked for, echoed into the reply.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    /// Original free-text query, if any.
    pub query: Option<&'a str>,
    /// Merged search parameters sent to the provider.
    pub params: &'a SearchParams,
}

/// Per-region figures for a price comparison.
#[derive(Debug, Clone)]
pub struct RegionSummary {
    /// Region as requested by the caller.
    pub region: String,
    /// Statistics over the region's records.
    pub stats: PriceStatistics,
    /// Cheapest positive-priced observation in the region.
    pub cheapest: Option<PriceRecord>,
}

/// Per-item figures for a trend report.
#[derive(Debug, Clone)]
pub struct ItemSummary {
    /// Item as requested by the caller.
    pub item: String,
    /// Statistics over the item's current records.
    pub stats: PriceStatistics,
}

/// Renders a populated price search.
#[must_use]
pub fn format_search(
    ctx: &SearchContext<'_>,
    records: &[PriceRecord],
    stats: &PriceStatistics,
    limit: usize,
) -> ToolCallResult {
    let mut out = String::new();
    let _ = writeln!(out, "## Malaysian price search");
    if let Some(query) = ctx.query {
        let _ = writeln!(out, "Query: \"{query}\"");
    }
    let _ = writeln!(out, "Filters: {}", ctx.params.describe());
    out.push('\n');

    write_statistics(&mut out, stats);

    let shown = limit.clamp(1, MAX_DISPLAYED_RECORDS).min(records.len());
    let _ = writeln!(out, "\n### Cheapest observations");
    for (rank, record) in sorted_by_price(records).into_iter().take(shown).enumerate() {
        write_record(&mut out, rank + 1, record);
    }
    if records.len() > shown {
        let _ = writeln!(out, "\nShowing {shown} of {} records.", records.len());
    }

    finish(out)
}

/// Renders the guidance shown when the provider returned nothing.
#[must_use]
pub fn no_results(ctx: &SearchContext<'_>) -> ToolCallResult {
    let mut out = String::new();
    let _ = writeln!(out, "## No prices found");
    match ctx.query {
        Some(query) => {
            let _ = writeln!(out, "Nothing matched \"{query}\" ({}).", ctx.params.describe());
        }
        None => {
            let _ = writeln!(out, "Nothing matched {}.", ctx.params.describe());
        }
    }
    write_search_guidance(&mut out);
    ToolCallResult::text(out.trim_end())
}

/// Renders the fallback used when the provider failed or timed out.
#[must_use]
pub fn service_unavailable(tool: &str, fault: &str) -> ToolCallResult {
    ToolCallResult::text(format!(
        "## Price service unavailable\n\
         `{tool}` could not reach the price data service: {fault}\n\n\
         Prices cannot be shown right now. Please try again in a few moments."
    ))
}

/// Renders the notice returned when a client exceeded its request ceiling.
#[must_use]
pub fn rate_limited(tool: &str, limits: &RateLimitConfig) -> ToolCallResult {
    ToolCallResult::text(format!(
        "## Rate limit reached\n\
         `{tool}` was not run: each client may make at most {} requests per minute \
         and {} requests per hour.\n\n\
         Please wait a little before asking again.",
        limits.per_minute, limits.per_hour
    ))
}

/// Renders a cross-region comparison for one item.
#[must_use]
pub fn format_comparison(item: &str, regions: &[RegionSummary]) -> ToolCallResult {
    let mut out = String::new();
    let _ = writeln!(out, "## Price comparison: {item}");
    out.push('\n');
    let _ = writeln!(out, "| Region | Records | Average | Lowest | Highest |");
    let _ = writeln!(out, "|---|---|---|---|---|");

    let mut ordered: Vec<&RegionSummary> = regions.iter().collect();
    ordered.sort_by(|a, b| {
        a.stats
            .is_empty()
            .cmp(&b.stats.is_empty())
            .then(a.stats.average.total_cmp(&b.stats.average))
    });

    for summary in &ordered {
        if summary.stats.is_empty() {
            let _ = writeln!(out, "| {} | 0 | - | - | - |", summary.region);
        } else {
            let s = &summary.stats;
            let _ = writeln!(
                out,
                "| {} | {} | RM{:.2} | RM{:.2} | RM{:.2} |",
                summary.region, s.count, s.average, s.min, s.max
            );
        }
    }

    let with_data: Vec<&&RegionSummary> = ordered.iter().filter(|r| !r.stats.is_empty()).collect();
    if let (Some(cheapest), Some(dearest)) = (with_data.first(), with_data.last()) {
        out.push('\n');
        let _ = writeln!(
            out,
            "Cheapest region on average: **{}** (RM{:.2}).",
            cheapest.region, cheapest.stats.average
        );
        if with_data.len() > 1 && dearest.stats.average > 0.0 {
            let gap = dearest.stats.average - cheapest.stats.average;
            let _ = writeln!(
                out,
                "That is RM{gap:.2} ({:.1}%) below {}.",
                gap / dearest.stats.average * 100.0,
                dearest.region
            );
        }
        if let Some(record) = &cheapest.cheapest {
            let _ = writeln!(
                out,
                "Best single price there: RM{:.2} at {} ({}).",
                record.price, record.outlet_name, record.district
            );
        }
    }

    finish(out)
}

/// Renders a trend summary over the current observations of several items.
#[must_use]
pub fn format_trends(period: &str, location: Option<&str>, items: &[ItemSummary]) -> ToolCallResult {
    let mut out = String::new();
    let _ = writeln!(out, "## Price trend summary ({period})");
    if let Some(location) = location {
        let _ = writeln!(out, "Location: {location}");
    }
    let _ = writeln!(
        out,
        "Historical series are not available from the price source; the figures \
         below describe the latest observations and how widely they vary."
    );

    for summary in items {
        let _ = writeln!(out, "\n### {}", summary.item);
        let s = &summary.stats;
        if s.is_empty() {
            let _ = writeln!(out, "No current observations.");
            continue;
        }
        let _ = writeln!(
            out,
            "- Average RM{:.2} over {} records (RM{:.2} to RM{:.2})",
            s.average, s.count, s.min, s.max
        );
        let _ = writeln!(out, "- {}", spread_commentary(s));
    }

    finish(out)
}

/// Renders market insights for a category and/or location.
#[must_use]
pub fn format_insights(
    scope: &str,
    records: &[PriceRecord],
    stats: &PriceStatistics,
) -> ToolCallResult {
    let mut out = String::new();
    let _ = writeln!(out, "## Market insights: {scope}");
    out.push('\n');
    write_statistics(&mut out, stats);

    let mut by_outlet: BTreeMap<RetailerType, Vec<f64>> = BTreeMap::new();
    for record in records {
        by_outlet
            .entry(record.outlet_category)
            .or_default()
            .push(record.price);
    }

    let _ = writeln!(out, "\n### Average by outlet type");
    let mut cheapest_type: Option<(RetailerType, f64)> = None;
    for (kind, prices) in by_outlet {
        let outlet_stats = PriceStatistics::from_prices(prices);
        if outlet_stats.is_empty() {
            continue;
        }
        let _ = writeln!(
            out,
            "- {kind}: RM{:.2} ({} records)",
            outlet_stats.average, outlet_stats.count
        );
        if cheapest_type.map_or(true, |(_, avg)| outlet_stats.average < avg) {
            cheapest_type = Some((kind, outlet_stats.average));
        }
    }
    if let Some((kind, _)) = cheapest_type {
        let _ = writeln!(out, "\nLowest average outlet type: **{kind}**.");
    }

    let _ = writeln!(out, "\n### Best buys");
    for (rank, record) in sorted_by_price(records)
        .into_iter()
        .filter(|r| r.price > 0.0)
        .take(3)
        .enumerate()
    {
        write_record(&mut out, rank + 1, record);
    }

    let _ = writeln!(out, "\n{}", spread_commentary(stats));

    finish(out)
}

/// Canned commentary on how much prices differ between outlets.
fn spread_commentary(stats: &PriceStatistics) -> &'static str {
    if stats.count < 2 {
        "Only one observation, so no spread can be judged."
    } else if stats.range_percent >= 25.0 {
        "Prices vary widely between outlets; shopping around pays off."
    } else if stats.range_percent >= 10.0 {
        "Moderate spread between outlets."
    } else {
        "Prices are tightly clustered across outlets."
    }
}

fn sorted_by_price(records: &[PriceRecord]) -> Vec<&PriceRecord> {
    let mut sorted: Vec<&PriceRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.price
            .total_cmp(&b.price)
            .then_with(|| a.outlet_name.cmp(&b.outlet_name))
    });
    sorted
}

fn write_statistics(out: &mut String, stats: &PriceStatistics) {
    let _ = writeln!(out, "### Price statistics");
    let _ = writeln!(out, "- Records: {}", stats.count);
    let _ = writeln!(out, "- Average: RM{:.2}", stats.average);
    let _ = writeln!(out, "- Lowest: RM{:.2}", stats.min);
    let _ = writeln!(out, "- Highest: RM{:.2}", stats.max);
    let _ = writeln!(
        out,
        "- Spread: RM{:.2} ({:.1}% of highest)",
        stats.range, stats.range_percent
    );
}

fn write_record(out: &mut String, rank: usize, record: &PriceRecord) {
    let _ = writeln!(
        out,
        "{rank}. **{}**: RM{:.2} / {}",
        record.item_name, record.price, record.unit
    );
    let _ = writeln!(
        out,
        "   {} ({}), {}, {} · {}",
        record.outlet_name, record.outlet_category, record.district, record.state, record.date
    );
}

fn write_search_guidance(out: &mut String) {
    let _ = writeln!(out, "\nSearchable categories include:");
    for group in ITEM_GROUPS {
        let _ = writeln!(out, "- {} ({})", group.english, group.keyword);
    }
    let _ = writeln!(
        out,
        "\nTips: name a state or district (e.g. Selangor, Johor Bahru), \
         loosen any price bounds, or drop the outlet type filter."
    );
}

fn finish(mut out: String) -> ToolCallResult {
    let _ = write!(
        out,
        "\n{TIMESTAMP_PREFIX}{}_",
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    );
    ToolCallResult::text(out)
}
