// SPDX-License-Identifier: GPL-3.0-or-later
use pfwatch_application::{PassReport, PassSummary};
use pfwatch_domain::{format_time_left, is_urgent, Listing, ListingPage, TrackedListing};

/// One line per tracked listing, in insertion order.
pub fn favorites_table(listings: &[TrackedListing], capacity: usize) -> String {
    let mut out = format!("favorites {}/{}\n", listings.len(), capacity);
    if listings.is_empty() {
        out.push_str("  (none)\n");
        return out;
    }
    for item in listings {
        out.push_str(&format!(
            "  {:<10} {:<9} {:>8}  {}/{}  {} ({})  {}\n",
            item.id.to_string(),
            item.status().to_string(),
            countdown(item.time_left),
            item.slots_filled,
            item.slots_available,
            item.duty,
            item.group_key(),
            item.name,
        ));
    }
    out
}

pub fn search_results(page: &ListingPage) -> String {
    let mut out = String::new();
    for listing in &page.data {
        out.push_str(&listing_line(listing));
        out.push('\n');
    }
    out.push_str(&format!(
        "page {}/{} ({} total)\n",
        page.pagination.page,
        page.pagination.total_pages,
        page.pagination.total
    ));
    out
}

fn listing_line(listing: &Listing) -> String {
    let label = listing
        .category
        .label_zh()
        .map(str::to_string)
        .unwrap_or_else(|| listing.category.to_string());
    format!(
        "{:<10} {:>8}  {}/{}  [{}] {} @ {}  {}",
        listing.id.to_string(),
        countdown(listing.time_left),
        listing.slots_filled,
        listing.slots_available,
        label,
        listing.duty,
        listing.datacenter,
        listing.name,
    )
}

fn countdown(seconds: i64) -> String {
    let text = format_time_left(seconds);
    if is_urgent(seconds) {
        format!("!{}", text)
    } else {
        text
    }
}

pub fn pass_report(report: &PassReport) -> String {
    match report {
        PassReport::Skipped => "check skipped, another pass is running".to_string(),
        PassReport::Idle => "nothing to check".to_string(),
        PassReport::Completed(summary) => summary_line(summary),
    }
}

fn summary_line(summary: &PassSummary) -> String {
    format!(
        "checked {} in {} group(s): {} fulfilled, {} expired, {} failed group(s)",
        summary.checked,
        summary.groups,
        summary.newly_fulfilled.len(),
        summary.expired.len(),
        summary.failed_groups
    )
}
