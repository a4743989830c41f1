//! Price data providers.
//!
//! The tool pipeline depends on exactly one operation of its data source,
//! [`PriceProvider::search`]. Two implementations ship with the server:
//!
//! - [`SampleProvider`]: a built-in table of observations, used by default
//! - [`HttpProvider`]: an upstream REST service returning `PriceRecord` JSON

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use super::query::{contains_phrase, synonyms_for};
use super::{PriceRecord, RetailerType, SearchParams};
use crate::error::ProviderError;

/// A source of price observations.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Returns every record matching `params`. An empty result is not an error.
    async fn search(&self, params: &SearchParams) -> Result<Vec<PriceRecord>, ProviderError>;
}

/// Words in an opaque search term that never identify an item.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "price", "prices", "harga", "cheap", "cheapest", "murah", "termurah",
    "how", "much", "what", "where", "with", "near", "dekat", "kedai", "today", "current",
    "under", "below", "above", "over", "between",
];

/// Returns `true` when `record` satisfies every filter in `params`.
#[must_use]
pub fn record_matches(record: &PriceRecord, params: &SearchParams) -> bool {
    if let Some(item) = &params.item {
        let synonyms = synonyms_for(item);
        if !synonyms
            .iter()
            .any(|s| contains_phrase(&record.item_name, s))
        {
            return false;
        }
    } else if let Some(term) = &params.term {
        if !term_matches(term, &record.item_name) {
            return false;
        }
    }

    if let Some(location) = &params.location {
        let place = format!("{} {}", record.district, record.state);
        if !contains_phrase(&place, location) {
            return false;
        }
    }

    if params
        .retailer_type
        .is_some_and(|kind| kind != record.outlet_category)
    {
        return false;
    }
    if params.min_price.is_some_and(|min| record.price < min) {
        return false;
    }
    if params.max_price.is_some_and(|max| record.price > max) {
        return false;
    }
    true
}

/// An opaque term matches when any meaningful word of it names the item.
/// A term with no meaningful words matches everything.
fn term_matches(term: &str, item_name: &str) -> bool {
    let lowered = term.to_lowercase();
    let mut words = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3 && !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !STOPWORDS.contains(w))
        .peekable();

    if words.peek().is_none() {
        return true;
    }
    words.any(|w| contains_phrase(item_name, w))
}

/// Built-in table of recent observations across Malaysian outlets.
#[derive(Debug, Clone)]
pub struct SampleProvider {
    records: Vec<PriceRecord>,
}

type SampleRow = (
    &'static str,
    f64,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    RetailerType,
    (i32, u32, u32),
);

const SAMPLE_ROWS: &[SampleRow] = &[
    ("AYAM BERSIH - STANDARD", 9.90, "1kg", "Lotus's Kota Damansara", "Petaling", "Selangor", RetailerType::Hypermarket, (2024, 5, 2)),
    ("AYAM BERSIH - STANDARD", 9.40, "1kg", "Pasar Borong Selayang", "Gombak", "Selangor", RetailerType::WetMarket, (2024, 5, 2)),
    ("AYAM BERSIH - STANDARD", 10.50, "1kg", "Kedai Runcit Ah Keong", "Klang", "Selangor", RetailerType::Grocery, (2024, 5, 1)),
    ("AYAM BERSIH - STANDARD", 9.20, "1kg", "Pasar Awam Larkin", "Johor Bahru", "Johor", RetailerType::WetMarket, (2024, 5, 2)),
    ("AYAM BERSIH - STANDARD", 10.20, "1kg", "AEON Big Tebrau", "Johor Bahru", "Johor", RetailerType::Hypermarket, (2024, 5, 2)),
    ("AYAM BERSIH - STANDARD", 9.80, "1kg", "Pasar Chow Kit", "Kuala Lumpur", "W.P. Kuala Lumpur", RetailerType::WetMarket, (2024, 5, 3)),
    ("AYAM BERSIH - STANDARD", 9.60, "1kg", "Pasar Besar Kuantan", "Kuantan", "Pahang", RetailerType::WetMarket, (2024, 5, 1)),
    ("BERAS SUPER TEMPATAN 5% HANCUR", 26.00, "10kg", "Lotus's Kota Damansara", "Petaling", "Selangor", RetailerType::Hypermarket, (2024, 5, 2)),
    ("BERAS SUPER TEMPATAN 5% HANCUR", 13.50, "5kg", "Mydin Mall Kota Bharu", "Kota Bharu", "Kelantan", RetailerType::Hypermarket, (2024, 5, 2)),
    ("BERAS SUPER TEMPATAN 5% HANCUR", 27.50, "10kg", "Kedai Runcit Ah Keong", "Klang", "Selangor", RetailerType::Grocery, (2024, 5, 1)),
    ("BERAS SUPER TEMPATAN 5% HANCUR", 26.80, "10kg", "Econsave Kinta", "Kinta", "Perak", RetailerType::Supermarket, (2024, 5, 2)),
    ("MINYAK MASAK TULEN CAP BURUH (PAKET)", 2.50, "1kg", "Kedai Runcit Ah Keong", "Klang", "Selangor", RetailerType::Grocery, (2024, 5, 1)),
    ("MINYAK MASAK TULEN CAP BURUH (PAKET)", 2.50, "1kg", "99 Speedmart Kajang", "Hulu Langat", "Selangor", RetailerType::MiniMarket, (2024, 5, 2)),
    ("MINYAK MASAK SAJI (BOTOL)", 31.90, "5kg", "Giant Seremban 2", "Seremban", "Negeri Sembilan", RetailerType::Hypermarket, (2024, 5, 2)),
    ("IKAN KEMBUNG (ANTARA 8 HINGGA 12 EKOR SEKILOGRAM)", 14.00, "1kg", "Pasar Chow Kit", "Kuala Lumpur", "W.P. Kuala Lumpur", RetailerType::WetMarket, (2024, 5, 3)),
    ("IKAN KEMBUNG (ANTARA 8 HINGGA 12 EKOR SEKILOGRAM)", 12.50, "1kg", "Pasar Besar Kuantan", "Kuantan", "Pahang", RetailerType::WetMarket, (2024, 5, 1)),
    ("IKAN SELAR KUNING", 11.00, "1kg", "Pasar Awam Larkin", "Johor Bahru", "Johor", RetailerType::WetMarket, (2024, 5, 2)),
    ("DAGING LEMBU TEMPATAN", 35.00, "1kg", "Pasar Borong Selayang", "Gombak", "Selangor", RetailerType::WetMarket, (2024, 5, 2)),
    ("DAGING LEMBU IMPORT INDIA (BERTULANG)", 23.90, "1kg", "Lotus's Kota Damansara", "Petaling", "Selangor", RetailerType::Hypermarket, (2024, 5, 2)),
    ("DAGING KAMBING IMPORT", 39.90, "1kg", "AEON Big Tebrau", "Johor Bahru", "Johor", RetailerType::Hypermarket, (2024, 5, 2)),
    ("TELUR GRED A", 13.20, "30 biji", "99 Speedmart Kajang", "Hulu Langat", "Selangor", RetailerType::MiniMarket, (2024, 5, 2)),
    ("TELUR GRED A", 12.90, "30 biji", "Pasar Awam Larkin", "Johor Bahru", "Johor", RetailerType::WetMarket, (2024, 5, 2)),
    ("GULA PASIR HALUS", 2.85, "1kg", "7-Eleven Jalan Tun Razak", "Kuala Lumpur", "W.P. Kuala Lumpur", RetailerType::ConvenienceStore, (2024, 5, 3)),
    ("GULA PASIR HALUS", 2.85, "1kg", "Econsave Kinta", "Kinta", "Perak", RetailerType::Supermarket, (2024, 5, 2)),
    ("BETIK BIASA", 4.50, "1kg", "Pasar Tani Jalan Kebun", "Klang", "Selangor", RetailerType::WetMarket, (2024, 5, 4)),
    ("BETIK BIASA", 5.20, "1kg", "Village Grocer Bangsar", "Kuala Lumpur", "W.P. Kuala Lumpur", RetailerType::Supermarket, (2024, 5, 3)),
];

impl SampleProvider {
    /// Creates a provider over the built-in sample table.
    #[must_use]
    pub fn new() -> Self {
        let records = SAMPLE_ROWS
            .iter()
            .filter_map(
                |&(item, price, unit, outlet, district, state, category, (y, m, d))| {
                    Some(PriceRecord {
                        item_name: item.to_string(),
                        price,
                        unit: unit.to_string(),
                        outlet_name: outlet.to_string(),
                        district: district.to_string(),
                        state: state.to_string(),
                        outlet_category: category,
                        date: NaiveDate::from_ymd_opt(y, m, d)?,
                    })
                },
            )
            .collect();
        Self::with_records(records)
    }

    /// Creates a provider over caller-supplied records.
    #[must_use]
    pub const fn with_records(records: Vec<PriceRecord>) -> Self {
        Self { records }
    }
}

impl Default for SampleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceProvider for SampleProvider {
    fn name(&self) -> &'static str {
        "sample"
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<PriceRecord>, ProviderError> {
        let found: Vec<PriceRecord> = self
            .records
            .iter()
            .filter(|record| record_matches(record, params))
            .cloned()
            .collect();
        debug!(matched = found.len(), filters = %params.describe(), "Sample provider search");
        Ok(found)
    }
}

/// Client for an upstream price service.
///
/// Issues `GET {base_url}/prices` with the search parameters as query
/// string and expects a JSON array of [`PriceRecord`].
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpProvider {
    /// Creates a client for the service rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ProviderError::Request)?;

        Ok(Self {
            client,
            endpoint: format!("{}/prices", base_url.trim_end_matches('/')),
        })
    }

    /// The fully-qualified search endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PriceProvider for HttpProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<PriceRecord>, ProviderError> {
        debug!(endpoint = %self.endpoint, filters = %params.describe(), "Querying price service");

        let response = self
            .client
            .get(&self.endpoint)
            .query(params)
            .send()
            .await
            .map_err(ProviderError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json::<Vec<PriceRecord>>()
            .await
            .map_err(ProviderError::Decode)
    }
}
