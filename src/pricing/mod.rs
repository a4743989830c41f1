//! Price domain: records, search parameters and the pipeline stages that
//! operate on them.
//!
//! - [`query`]: natural-language query interpretation
//! - [`stats`]: aggregate price metrics
//! - [`format`]: rendering of tool results
//! - [`provider`]: the external price data source

pub mod format;
pub mod provider;
pub mod query;
pub mod stats;

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use provider::{HttpProvider, PriceProvider, SampleProvider};
pub use query::parse_query;
pub use stats::PriceStatistics;

/// Outlet category of a retail premise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetailerType {
    /// Large-format store ("pasar raya besar").
    Hypermarket,
    /// Supermarket ("pasar raya").
    Supermarket,
    /// Mini market.
    MiniMarket,
    /// Convenience store ("kedai serbaneka").
    ConvenienceStore,
    /// Wet or farmers' market ("pasar basah", "pasar tani").
    WetMarket,
    /// Neighbourhood grocer ("kedai runcit").
    Grocery,
    /// Anything the upstream source labels differently.
    #[serde(other)]
    Other,
}

impl RetailerType {
    /// Every category a caller may filter on.
    pub const FILTERABLE: [Self; 6] = [
        Self::Hypermarket,
        Self::Supermarket,
        Self::MiniMarket,
        Self::ConvenienceStore,
        Self::WetMarket,
        Self::Grocery,
    ];

    /// Wire name used in tool schemas and upstream queries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hypermarket => "hypermarket",
            Self::Supermarket => "supermarket",
            Self::MiniMarket => "mini_market",
            Self::ConvenienceStore => "convenience_store",
            Self::WetMarket => "wet_market",
            Self::Grocery => "grocery",
            Self::Other => "other",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Hypermarket => "Hypermarket",
            Self::Supermarket => "Supermarket",
            Self::MiniMarket => "Mini market",
            Self::ConvenienceStore => "Convenience store",
            Self::WetMarket => "Wet market",
            Self::Grocery => "Grocery",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for RetailerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One observed price at one outlet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Item description as published (e.g. "AYAM BERSIH - STANDARD").
    pub item_name: String,
    /// Price in ringgit; never negative.
    pub price: f64,
    /// Unit of sale (e.g. "1kg", "5kg", "sebiji").
    pub unit: String,
    /// Outlet name.
    pub outlet_name: String,
    /// District of the outlet.
    pub district: String,
    /// State of the outlet.
    pub state: String,
    /// Outlet category.
    pub outlet_category: RetailerType,
    /// Observation date.
    pub date: NaiveDate,
}

/// Structured filter handed to the price data provider.
///
/// All fields empty means "match everything".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchParams {
    /// Free-text term, used when no item was recognised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    /// Canonical item keyword (see [`query::ITEM_GROUPS`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    /// State or district.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Outlet category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retailer_type: Option<RetailerType>,
    /// Inclusive lower price bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    /// Inclusive upper price bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
}

impl SearchParams {
    /// Fills every unset field of `self` from `inferred`.
    ///
    /// Explicit values always win over values inferred from free text.
    #[must_use]
    pub fn or(self, inferred: Self) -> Self {
        Self {
            term: self.term.or(inferred.term),
            item: self.item.or(inferred.item),
            location: self.location.or(inferred.location),
            retailer_type: self.retailer_type.or(inferred.retailer_type),
            min_price: self.min_price.or(inferred.min_price),
            max_price: self.max_price.or(inferred.max_price),
        }
    }

    /// One-line description of the active filters, for response headers.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(item) = &self.item {
            parts.push(format!("item: {item}"));
        } else if let Some(term) = &self.term {
            parts.push(format!("search: \"{term}\""));
        }
        if let Some(location) = &self.location {
            parts.push(format!("location: {location}"));
        }
        if let Some(retailer) = self.retailer_type {
            parts.push(format!("outlet: {retailer}"));
        }
        match (self.min_price, self.max_price) {
            (Some(min), Some(max)) => parts.push(format!("price: RM{min:.2}–RM{max:.2}")),
            (Some(min), None) => parts.push(format!("price ≥ RM{min:.2}")),
            (None, Some(max)) => parts.push(format!("price ≤ RM{max:.2}")),
            (None, None) => {}
        }
        if parts.is_empty() {
            "all items".to_string()
        } else {
            parts.join(", ")
        }
    }
}
