//! Natural-language query interpretation.
//!
//! [`parse_query`] turns free text such as `"cheapest ayam in selangor under
//! RM20"` into [`SearchParams`]. It is pure and never fails: unrecognised
//! input yields empty parameters and the caller falls back to an opaque term.
//!
//! Matching works on lower-cased alphanumeric tokens so that multi-word
//! phrases ("cooking oil", "kuala lumpur", "pasar raya") and punctuation
//! ("ayam?") are handled uniformly.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{RetailerType, SearchParams};

/// A bilingual group of terms naming the same commodity.
#[derive(Debug, Clone, Copy)]
pub struct ItemGroup {
    /// Canonical keyword placed in [`SearchParams::item`].
    pub keyword: &'static str,
    /// English display name.
    pub english: &'static str,
    /// Every phrase that selects this group, English and Malay.
    pub synonyms: &'static [&'static str],
}

/// Commodity synonym table. Earlier groups win when several match, so more
/// specific groups (mutton before beef) come first.
pub const ITEM_GROUPS: &[ItemGroup] = &[
    ItemGroup {
        keyword: "ayam",
        english: "chicken",
        synonyms: &["chicken", "chickens", "ayam"],
    },
    ItemGroup {
        keyword: "beras",
        english: "rice",
        synonyms: &["rice", "beras", "nasi"],
    },
    ItemGroup {
        keyword: "minyak masak",
        english: "cooking oil",
        synonyms: &["cooking oil", "oil", "minyak masak", "minyak"],
    },
    ItemGroup {
        keyword: "ikan",
        english: "fish",
        synonyms: &["fish", "ikan", "kembung", "selar", "tilapia"],
    },
    ItemGroup {
        keyword: "kambing",
        english: "mutton",
        synonyms: &["mutton", "lamb", "goat", "kambing"],
    },
    ItemGroup {
        keyword: "daging",
        english: "beef",
        synonyms: &["beef", "meat", "daging", "lembu"],
    },
    ItemGroup {
        keyword: "telur",
        english: "eggs",
        synonyms: &["egg", "eggs", "telur"],
    },
    ItemGroup {
        keyword: "gula",
        english: "sugar",
        synonyms: &["sugar", "gula"],
    },
    ItemGroup {
        keyword: "tepung",
        english: "flour",
        synonyms: &["flour", "tepung"],
    },
    ItemGroup {
        keyword: "bawang",
        english: "onion",
        synonyms: &["onion", "onions", "bawang"],
    },
    ItemGroup {
        keyword: "susu",
        english: "milk",
        synonyms: &["milk", "susu"],
    },
    ItemGroup {
        keyword: "betik",
        english: "papaya",
        synonyms: &["papaya", "betik"],
    },
    ItemGroup {
        keyword: "sayur",
        english: "vegetables",
        synonyms: &["vegetable", "vegetables", "sayur", "sayuran", "kangkung", "sawi", "kobis", "cabbage"],
    },
];

/// Malaysian states, federal territories and major districts, as
/// `(phrase, canonical name)`.
const GAZETTEER: &[(&str, &str)] = &[
    ("johor", "johor"),
    ("kedah", "kedah"),
    ("kelantan", "kelantan"),
    ("melaka", "melaka"),
    ("malacca", "melaka"),
    ("negeri sembilan", "negeri sembilan"),
    ("pahang", "pahang"),
    ("perak", "perak"),
    ("perlis", "perlis"),
    ("pulau pinang", "pulau pinang"),
    ("penang", "pulau pinang"),
    ("sabah", "sabah"),
    ("sarawak", "sarawak"),
    ("selangor", "selangor"),
    ("terengganu", "terengganu"),
    ("kuala lumpur", "kuala lumpur"),
    ("kl", "kuala lumpur"),
    ("putrajaya", "putrajaya"),
    ("labuan", "labuan"),
    ("petaling jaya", "petaling"),
    ("petaling", "petaling"),
    ("shah alam", "petaling"),
    ("klang", "klang"),
    ("gombak", "gombak"),
    ("hulu langat", "hulu langat"),
    ("kajang", "hulu langat"),
    ("sepang", "sepang"),
    ("kuala langat", "kuala langat"),
    ("kuala selangor", "kuala selangor"),
    ("johor bahru", "johor bahru"),
    ("batu pahat", "batu pahat"),
    ("muar", "muar"),
    ("kluang", "kluang"),
    ("ipoh", "kinta"),
    ("kinta", "kinta"),
    ("taiping", "larut dan matang"),
    ("seremban", "seremban"),
    ("kuantan", "kuantan"),
    ("alor setar", "kota setar"),
    ("kota setar", "kota setar"),
    ("kota bharu", "kota bharu"),
    ("kuala terengganu", "kuala terengganu"),
    ("kota kinabalu", "kota kinabalu"),
    ("kuching", "kuching"),
    ("miri", "miri"),
    ("sibu", "sibu"),
    ("george town", "timur laut"),
    ("georgetown", "timur laut"),
    ("seberang perai", "seberang perai tengah"),
    ("bukit mertajam", "seberang perai tengah"),
];

/// Outlet-category keywords. Earlier entries win, so "pasar raya besar"
/// resolves before "pasar raya", which resolves before bare "pasar".
const RETAILER_KEYWORDS: &[(RetailerType, &[&str])] = &[
    (
        RetailerType::Hypermarket,
        &["hypermarket", "hypermarkets", "pasar raya besar", "pasaraya besar"],
    ),
    (
        RetailerType::Supermarket,
        &["supermarket", "supermarkets", "pasar raya", "pasaraya"],
    ),
    (
        RetailerType::MiniMarket,
        &["mini market", "minimarket", "pasar mini"],
    ),
    (
        RetailerType::ConvenienceStore,
        &["convenience", "kedai serbaneka", "serbaneka", "7 eleven"],
    ),
    (
        RetailerType::WetMarket,
        &["wet market", "pasar basah", "pasar tani", "farmers market", "pasar"],
    ),
    (
        RetailerType::Grocery,
        &["grocer", "grocers", "grocery", "kedai runcit", "runcit"],
    ),
];

const NUMBER: &str = r"(\d+(?:\.\d+)?)";

static CURRENCY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\brm\s*(\d)|\bringgit\b").expect("currency regex is valid"));

static BETWEEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:between|antara)\s+{NUMBER}\s*(?:and|to|dan|hingga|-)\s*{NUMBER}"
    ))
    .expect("price bound regex is valid")
});

static UPPER_BOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?:\b(?:under|below|less than|cheaper than|max(?:imum)?|at most|up to|bawah|kurang dari(?:pada)?)|<=?)\s*{NUMBER}"
    ))
    .expect("price bound regex is valid")
});

static LOWER_BOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?:\b(?:above|over|more than|min(?:imum)?|at least|atas|lebih dari(?:pada)?)|>=?)\s*{NUMBER}"
    ))
    .expect("price bound regex is valid")
});

/// Interprets free text as structured search parameters.
///
/// Every extraction is independent, so any subset of fields may be set.
/// [`SearchParams::term`] is left unset; the caller decides whether the
/// original text should travel as an opaque term.
#[must_use]
pub fn parse_query(text: &str) -> SearchParams {
    let lowered = text.to_lowercase();
    let tokens = tokenize(&lowered);

    let (min_price, max_price) = extract_price_bounds(&lowered);

    SearchParams {
        term: None,
        item: extract_item(&tokens).map(|group| group.keyword.to_string()),
        location: extract_location(&tokens).map(str::to_string),
        retailer_type: extract_retailer(&tokens),
        min_price,
        max_price,
    }
}

/// Finds the synonym group for a keyword or any of its synonyms.
#[must_use]
pub fn item_group(name: &str) -> Option<&'static ItemGroup> {
    let lowered = name.to_lowercase();
    let tokens = tokenize(&lowered);
    extract_item(&tokens)
}

/// Every phrase that should match records for `item`.
///
/// Unknown items match only themselves.
#[must_use]
pub fn synonyms_for(item: &str) -> Vec<String> {
    item_group(item).map_or_else(
        || vec![item.to_lowercase()],
        |group| group.synonyms.iter().map(|s| (*s).to_string()).collect(),
    )
}

/// Returns `true` when `phrase` occurs in `text` as whole words.
#[must_use]
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let lowered = text.to_lowercase();
    let tokens = tokenize(&lowered);
    find_phrase(&tokens, phrase).is_some()
}

fn tokenize(lowered: &str) -> Vec<&str> {
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Position of the first contiguous occurrence of `phrase` in `tokens`.
fn find_phrase(tokens: &[&str], phrase: &str) -> Option<usize> {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.is_empty() || words.len() > tokens.len() {
        return None;
    }
    tokens
        .windows(words.len())
        .position(|window| window == words.as_slice())
}

fn extract_item(tokens: &[&str]) -> Option<&'static ItemGroup> {
    ITEM_GROUPS.iter().find(|group| {
        group
            .synonyms
            .iter()
            .any(|synonym| find_phrase(tokens, synonym).is_some())
    })
}

/// Earliest mention in the text wins; on a tie the longer phrase wins.
fn extract_location(tokens: &[&str]) -> Option<&'static str> {
    GAZETTEER
        .iter()
        .filter_map(|(phrase, canonical)| {
            find_phrase(tokens, phrase).map(|pos| (pos, phrase.split_whitespace().count(), *canonical))
        })
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, _, canonical)| canonical)
}

fn extract_retailer(tokens: &[&str]) -> Option<RetailerType> {
    RETAILER_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| find_phrase(tokens, k).is_some()))
        .map(|(kind, _)| *kind)
}

fn extract_price_bounds(lowered: &str) -> (Option<f64>, Option<f64>) {
    let text = CURRENCY.replace_all(lowered, "$1");

    if let Some(caps) = BETWEEN.captures(&text) {
        let a = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
        let b = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
        if let (Some(a), Some(b)) = (a, b) {
            return (Some(a.min(b)), Some(a.max(b)));
        }
    }

    let first_number = |re: &Regex| {
        re.captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    };

    (first_number(&*LOWER_BOUND), first_number(&*UPPER_BOUND))
}
