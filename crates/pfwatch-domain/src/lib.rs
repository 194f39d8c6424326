// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

// ============================================================================
// Value Objects & IDs
// ============================================================================

/// Listing identifier as assigned by the Party Finder API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub u64);

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ListingId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u64> for ListingId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Duty category as named by the API.
///
/// Unknown names are carried through untouched so that queries built from a
/// tracked listing always echo back what the server sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    DutyRoulette,
    Dungeons,
    Guildhests,
    Trials,
    Raids,
    HighEndDuty,
    Pvp,
    GoldSaucer,
    Fates,
    TreasureHunt,
    TheHunt,
    GatheringForays,
    DeepDungeons,
    FieldOperations,
    VariantAndCriterionDungeonFinder,
    None,
    Other(String),
}

const CATEGORY_LABELS: &[(&str, &str)] = &[
    ("DutyRoulette", "随机任务"),
    ("Dungeons", "迷宫挑战"),
    ("Guildhests", "行会令"),
    ("Trials", "讨伐歼灭战"),
    ("Raids", "大型任务"),
    ("HighEndDuty", "高难度任务"),
    ("Pvp", "玩家对战"),
    ("GoldSaucer", "金碟游乐场"),
    ("Fates", "危命任务"),
    ("TreasureHunt", "寻宝"),
    ("TheHunt", "怪物狩猎"),
    ("GatheringForays", "采集活动"),
    ("DeepDungeons", "深层迷宫"),
    ("FieldOperations", "特殊场景探索"),
    ("VariantAndCriterionDungeonFinder", "特殊迷宫探索"),
    ("None", "无"),
];

impl Category {
    /// Name used on the wire.
    pub fn api_name(&self) -> &str {
        match self {
            Self::DutyRoulette => "DutyRoulette",
            Self::Dungeons => "Dungeons",
            Self::Guildhests => "Guildhests",
            Self::Trials => "Trials",
            Self::Raids => "Raids",
            Self::HighEndDuty => "HighEndDuty",
            Self::Pvp => "Pvp",
            Self::GoldSaucer => "GoldSaucer",
            Self::Fates => "Fates",
            Self::TreasureHunt => "TreasureHunt",
            Self::TheHunt => "TheHunt",
            Self::GatheringForays => "GatheringForays",
            Self::DeepDungeons => "DeepDungeons",
            Self::FieldOperations => "FieldOperations",
            Self::VariantAndCriterionDungeonFinder => "VariantAndCriterionDungeonFinder",
            Self::None => "None",
            Self::Other(name) => name,
        }
    }

    /// Chinese label shown by the official client, if the category is known.
    pub fn label_zh(&self) -> Option<&'static str> {
        if matches!(self, Self::Other(_)) {
            return None;
        }
        let api = self.api_name();
        CATEGORY_LABELS
            .iter()
            .find(|(name, _)| *name == api)
            .map(|(_, zh)| *zh)
    }

    /// Resolve either an API name or a Chinese label.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let api = CATEGORY_LABELS
            .iter()
            .find(|(_, zh)| *zh == raw)
            .map(|(api, _)| *api)
            .unwrap_or(raw);
        Self::from_api_name(api).unwrap_or_else(|| Self::Other(raw.to_string()))
    }

    fn from_api_name(name: &str) -> Option<Self> {
        let category = match name {
            "DutyRoulette" => Self::DutyRoulette,
            "Dungeons" => Self::Dungeons,
            "Guildhests" => Self::Guildhests,
            "Trials" => Self::Trials,
            "Raids" => Self::Raids,
            "HighEndDuty" => Self::HighEndDuty,
            "Pvp" => Self::Pvp,
            "GoldSaucer" => Self::GoldSaucer,
            "Fates" => Self::Fates,
            "TreasureHunt" => Self::TreasureHunt,
            "TheHunt" => Self::TheHunt,
            "GatheringForays" => Self::GatheringForays,
            "DeepDungeons" => Self::DeepDungeons,
            "FieldOperations" => Self::FieldOperations,
            "VariantAndCriterionDungeonFinder" => Self::VariantAndCriterionDungeonFinder,
            "None" => Self::None,
            _ => return None,
        };
        Some(category)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_name())
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for Category {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.api_name().to_string()
    }
}

/// Inferred state of a tracked listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Fulfilled,
    Expired,
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Fulfilled => write!(f, "fulfilled"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

// ============================================================================
// Remote Records
// ============================================================================

/// One party slot, only present on detail responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Slot {
    #[serde(default)]
    pub filled: bool,
    #[serde(default)]
    pub role: Option<String>,
    /// Job abbreviation when filled, otherwise a space separated list of accepted jobs.
    #[serde(default)]
    pub job: String,
}

/// A Party Finder listing as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    #[serde(default)]
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub duty: String,
    #[serde(default)]
    pub home_world: String,
    #[serde(default)]
    pub created_world: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default)]
    pub slots_filled: u32,
    #[serde(default)]
    pub slots_available: u32,
    /// Seconds until the listing lapses.
    #[serde(default)]
    pub time_left: i64,
    #[serde(default)]
    pub is_cross_world: bool,
    #[serde(default, deserialize_with = "deserialize_description")]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(default)]
    pub min_item_level: Option<u32>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub conditions: Option<String>,
    #[serde(default)]
    pub loot_rules: Option<String>,
    #[serde(default)]
    pub beginners_welcome: Option<bool>,
}

impl Listing {
    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(self.category.clone(), self.datacenter.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Pagination {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub total_pages: u32,
}

/// One page of `/listings`, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ListingPage {
    #[serde(default, alias = "listings")]
    pub data: Vec<Listing>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Filter parameters understood by `/listings`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListingQuery {
    pub category: Option<Category>,
    /// Single datacenter or a comma-joined list.
    pub datacenter: Option<String>,
    pub world: Option<String>,
    pub search: Option<String>,
    pub duty: Vec<u32>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListingQuery {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new() -> Self {
        Self::default()
    }

    /// Query matching every listing that shares `key`.
    pub fn for_group(key: &GroupKey, per_page: u32) -> Self {
        Self::new()
            .category(key.category.clone())
            .datacenter(key.datacenter.clone())
            .per_page(per_page)
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    pub fn world(mut self, world: impl Into<String>) -> Self {
        self.world = Some(world.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn duty(mut self, duty_id: u32) -> Self {
        self.duty.push(duty_id);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Page size, clamped to what the API accepts.
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page.clamp(1, Self::MAX_PER_PAGE));
        self
    }

    /// Flatten into `(name, value)` pairs; empty filters are omitted.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(category) = &self.category {
            pairs.push(("category", category.api_name().to_string()));
        }
        let text_filters = [
            ("datacenter", &self.datacenter),
            ("world", &self.world),
            ("search", &self.search),
        ];
        for (name, value) in text_filters {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                pairs.push((name, value.to_string()));
            }
        }
        for duty in &self.duty {
            pairs.push(("duty[]", duty.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        pairs
    }
}

// ============================================================================
// Tracked Listings
// ============================================================================

/// Key under which tracked listings share one reconciliation query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub category: Category,
    pub datacenter: String,
}

impl GroupKey {
    pub fn new(category: Category, datacenter: impl Into<String>) -> Self {
        Self {
            category,
            datacenter: datacenter.into(),
        }
    }
}

impl PartialOrd for Category {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Category {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.api_name().cmp(other.api_name())
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.category, self.datacenter)
    }
}

/// A favorited listing snapshot, refreshed by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedListing {
    pub id: ListingId,
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub duty: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub home_world: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default)]
    pub time_left: i64,
    #[serde(default)]
    pub slots_filled: u32,
    #[serde(default)]
    pub slots_available: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Once set, never cleared by reconciliation.
    #[serde(default)]
    pub fulfilled: bool,
    #[serde(default)]
    pub expired: bool,
}

impl TrackedListing {
    pub fn from_listing(listing: &Listing, saved_at: DateTime<Utc>) -> Self {
        Self {
            id: listing.id,
            name: listing.name.clone(),
            category: listing.category.clone(),
            duty: listing.duty.clone(),
            description: listing.description.clone(),
            home_world: listing.home_world.clone(),
            datacenter: listing.datacenter.clone(),
            time_left: listing.time_left,
            slots_filled: listing.slots_filled,
            slots_available: listing.slots_available,
            saved_at,
            updated_at: None,
            fulfilled: false,
            expired: false,
        }
    }

    /// Still eligible for polling.
    pub fn is_active(&self) -> bool {
        !self.fulfilled && !self.expired
    }

    /// Fulfilled wins over expired.
    pub fn status(&self) -> ListingStatus {
        if self.fulfilled {
            ListingStatus::Fulfilled
        } else if self.expired {
            ListingStatus::Expired
        } else {
            ListingStatus::Active
        }
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(self.category.clone(), self.datacenter.clone())
    }

    /// Copy the volatile fields observed on the server.
    pub fn refresh_from(&mut self, listing: &Listing) {
        self.time_left = listing.time_left;
        self.slots_filled = listing.slots_filled;
        self.slots_available = listing.slots_available;
        self.updated_at = listing.updated_at;
    }
}

/// Ids of tracked listings currently in `status`.
pub fn ids_with_status(listings: &[TrackedListing], status: ListingStatus) -> HashSet<ListingId> {
    listings
        .iter()
        .filter(|listing| match status {
            ListingStatus::Fulfilled => listing.fulfilled,
            ListingStatus::Expired => listing.expired,
            ListingStatus::Active => listing.is_active(),
        })
        .map(|listing| listing.id)
        .collect()
}

// ============================================================================
// Time helpers
// ============================================================================

/// Listings with less than this many seconds left are shown as urgent.
pub const URGENT_SECONDS: i64 = 5 * 60;

/// Render a countdown as `1h 05m`, `4m 09s` or `38s`.
pub fn format_time_left(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

pub fn is_urgent(seconds: i64) -> bool {
    seconds < URGENT_SECONDS
}

/// Parse an API timestamp. Offsets are honoured; naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_timestamp(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {value}"))),
    }
}

fn deserialize_description<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default())
}

// ============================================================================
// Tests
// ============================================================================
