// SPDX-License-Identifier: GPL-3.0-or-later

//! Listing fixtures shared by the unit tests.

use pfwatch_domain::{Category, Listing, ListingId};

pub fn listing(id: u64, time_left: i64) -> Listing {
    listing_in(id, time_left, Category::Raids, "Gaia")
}

pub fn listing_in(id: u64, time_left: i64, category: Category, datacenter: &str) -> Listing {
    Listing {
        id: ListingId(id),
        name: format!("Recruiter {id}"),
        category,
        duty: "AAC Cruiserweight M4 (Savage)".to_string(),
        home_world: "Tiamat".to_string(),
        created_world: "Tiamat".to_string(),
        datacenter: datacenter.to_string(),
        slots_filled: 4,
        slots_available: 8,
        time_left,
        is_cross_world: true,
        description: String::new(),
        updated_at: None,
        slots: Vec::new(),
        min_item_level: None,
        objective: None,
        conditions: None,
        loot_rules: None,
        beginners_welcome: None,
    }
}

/// Listings with ids `1..=n` carrying the given countdowns, in order.
pub fn batch_with_times(times: &[i64]) -> Vec<Listing> {
    times
        .iter()
        .enumerate()
        .map(|(i, time_left)| listing(i as u64 + 1, *time_left))
        .collect()
}
