//! Category to query-strategy table.
//!
//! Built once when the orchestrator is constructed. Unknown categories fall
//! back to the standard strategy.

use regex::Regex;
use std::collections::HashMap;

/// How a category is searched on a cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Curated text queries only; broad venue queries are low precision.
    Venue,
    /// Geocoded nearby call plus curated synonym text queries.
    Special,
    /// Geocoded nearby call, optional term text search, text-only fallback.
    Standard,
}

/// Everything the orchestrator needs to know about one category.
#[derive(Debug, Clone)]
pub struct CategoryProfile {
    pub id: String,
    pub strategy: Strategy,
    /// Provider-native place type for nearby calls.
    pub type_hint: Option<String>,
    /// Text query templates; `{location}` is replaced by the location text.
    pub curated_queries: Vec<String>,
    /// When set, a result must mention one of the category keywords.
    keyword_pattern: Option<Regex>,
}

impl CategoryProfile {
    /// Non-empty `keywords` make the category keyword-strict.
    pub fn new(id: &str, strategy: Strategy, type_hint: Option<&str>, queries: &[&str], keywords: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            strategy,
            type_hint: type_hint.map(str::to_string),
            curated_queries: queries.iter().map(|q| q.to_string()).collect(),
            keyword_pattern: keyword_regex(keywords),
        }
    }

    /// Profile for a category missing from the table.
    pub fn standard(id: &str) -> Self {
        Self::new(id, Strategy::Standard, Some(id), &[], &[])
    }

    pub fn is_venue(&self) -> bool {
        self.strategy == Strategy::Venue
    }

    pub fn requires_keyword(&self) -> bool {
        self.keyword_pattern.is_some()
    }

    /// Whether `haystack` mentions one of the category keywords. Always true
    /// for categories without keywords.
    pub fn matches_keyword(&self, haystack: &str) -> bool {
        self.keyword_pattern.as_ref().is_none_or(|re| re.is_match(haystack))
    }

    /// Curated queries with the location filled in.
    pub fn render_queries(&self, location: &str) -> Vec<String> {
        self.curated_queries.iter().map(|q| q.replace("{location}", location)).collect()
    }

    /// Human phrasing of the category id, e.g. `hair_makeup` -> `hair makeup`.
    pub fn display_name(&self) -> String {
        self.id.replace('_', " ")
    }
}

/// Word-boundary, case-insensitive match of any keyword, allowing a plural `s`.
fn keyword_regex(keywords: &[&str]) -> Option<Regex> {
    if keywords.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
    let pattern = format!(r"(?i)\b(?:{})s?\b", alternatives.join("|"));
    Some(Regex::new(&pattern).expect("keyword pattern built from escaped literals"))
}

/// Lookup table from category id to profile.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    profiles: HashMap<String, CategoryProfile>,
}

/// Lowercase, trim, and fold spaces/dashes to underscores.
pub fn category_id(category: &str) -> String {
    category.trim().to_lowercase().replace([' ', '-'], "_")
}

impl CategoryTable {
    pub fn new(profiles: impl IntoIterator<Item = CategoryProfile>) -> Self {
        Self { profiles: profiles.into_iter().map(|p| (p.id.clone(), p)).collect() }
    }

    /// The wedding-vendor table the engine ships with.
    pub fn builtin() -> Self {
        use Strategy::{Special, Venue};

        let venue_queries =
            ["wedding venues in {location}", "event venues in {location}", "wedding reception halls in {location}"];

        let venue_ids = ["wedding_venue", "venue", "reception_venue", "event_venue", "banquet_hall"];
        let mut profiles: Vec<CategoryProfile> =
            venue_ids.iter().map(|id| CategoryProfile::new(id, Venue, None, &venue_queries, &[])).collect();

        profiles.extend([
            CategoryProfile::new(
                "florist",
                Special,
                Some("florist"),
                &["wedding florist in {location}", "flower shop in {location}"],
                &["florist", "floral", "flower", "bloom", "petal", "botanical", "bouquet"],
            ),
            CategoryProfile::new(
                "photographer",
                Special,
                None,
                &["wedding photographer in {location}", "photography studio in {location}"],
                &["photographer", "photography", "photo", "portrait", "studio", "image"],
            ),
            CategoryProfile::new(
                "dj",
                Special,
                None,
                &["wedding dj in {location}", "dj services in {location}"],
                &["dj", "disc jockey", "entertainment", "music", "sound", "mobile disco"],
            ),
            CategoryProfile::new(
                "caterer",
                Special,
                None,
                &["wedding catering in {location}", "caterer in {location}"],
                &["caterer", "catering", "cater", "kitchen", "cuisine", "bbq", "food"],
            ),
            CategoryProfile::new(
                "jeweler",
                Special,
                Some("jewelry_store"),
                &["jewelry store in {location}", "engagement rings in {location}"],
                &[],
            ),
            CategoryProfile::new(
                "baker",
                Special,
                Some("bakery"),
                &["wedding cake bakery in {location}", "custom cakes in {location}"],
                &[],
            ),
            CategoryProfile::new(
                "officiant",
                Special,
                None,
                &["wedding officiant in {location}", "marriage officiant in {location}"],
                &[],
            ),
            CategoryProfile::new(
                "videographer",
                Special,
                None,
                &["wedding videographer in {location}", "videography services in {location}"],
                &[],
            ),
            CategoryProfile::new(
                "hair_makeup",
                Special,
                Some("beauty_salon"),
                &["bridal hair and makeup in {location}", "wedding makeup artist in {location}"],
                &[],
            ),
            CategoryProfile::new(
                "bridal_shop",
                Special,
                Some("clothing_store"),
                &["bridal shop in {location}", "wedding dress boutique in {location}"],
                &[],
            ),
        ]);

        Self::new(profiles)
    }

    /// Profile for `category`, or a standard profile when it is not listed.
    pub fn resolve(&self, category: &str) -> CategoryProfile {
        let id = category_id(category);
        match self.profiles.get(&id) {
            Some(profile) => profile.clone(),
            None => CategoryProfile::standard(&id),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::builtin()
    }
}
