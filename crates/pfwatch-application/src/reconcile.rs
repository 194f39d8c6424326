// SPDX-License-Identifier: GPL-3.0-or-later

//! Reconciliation passes over the tracked set.
//!
//! A pass reads an immutable snapshot, groups the active entries by
//! `(category, datacenter)`, issues one query per group concurrently,
//! classifies every entry against its group's batch and commits the outcomes
//! in a single [`FavoritesStore::apply_outcomes`] call. Passes never overlap:
//! a pass requested while another is running is skipped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use futures_util::future::join_all;
use pfwatch_alerts::{AlertHandle, AlertPort};
use pfwatch_client::ListingSource;
use pfwatch_domain::{GroupKey, ListingId, ListingQuery, ListingStatus, TrackedListing};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::classify;
use crate::favorites::{FavoritesStore, ListingOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassReport {
    /// Another pass was still running.
    Skipped,
    /// Nothing active to check.
    Idle,
    Completed(PassSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub pass_id: Uuid,
    pub groups: usize,
    pub failed_groups: usize,
    pub checked: usize,
    pub newly_fulfilled: Vec<ListingId>,
    pub expired: Vec<ListingId>,
    pub alerted: bool,
}

impl PassSummary {
    fn new() -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            groups: 0,
            failed_groups: 0,
            checked: 0,
            newly_fulfilled: Vec::new(),
            expired: Vec::new(),
            alerted: false,
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Reconciler {
    source: Arc<dyn ListingSource>,
    favorites: FavoritesStore,
    alert: Arc<dyn AlertPort>,
    per_page: u32,
    stale_after: Duration,
    in_flight: AtomicBool,
    playing: Mutex<Option<AlertHandle>>,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn ListingSource>,
        favorites: FavoritesStore,
        alert: Arc<dyn AlertPort>,
        per_page: u32,
        stale_after: Duration,
    ) -> Self {
        Self {
            source,
            favorites,
            alert,
            per_page,
            stale_after,
            in_flight: AtomicBool::new(false),
            playing: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Check every active tracked listing.
    pub async fn run_pass(&self) -> PassReport {
        self.run(None).await
    }

    /// Check a single tracked listing, e.g. right after it was added.
    pub async fn check_listing(&self, id: ListingId) -> PassReport {
        self.run(Some(id)).await
    }

    async fn run(&self, only: Option<ListingId>) -> PassReport {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            info!(target: "reconcile", "previous pass still running, skipping");
            return PassReport::Skipped;
        };

        let snapshot = self.favorites.snapshot().await;
        let active: Vec<&TrackedListing> = snapshot
            .iter()
            .filter(|item| item.is_active())
            .filter(|item| only.map_or(true, |id| item.id == id))
            .collect();

        if active.is_empty() {
            debug!(target: "reconcile", "no active favorites to check");
            return PassReport::Idle;
        }

        let mut groups = group_by_key(active.iter().copied());
        if only.is_none() {
            // Expired entries ride along on queries already being made for their group.
            for item in snapshot.iter().filter(|item| item.expired && !item.fulfilled) {
                if let Some(ids) = groups.get_mut(&item.group_key()) {
                    ids.push(item.id);
                }
            }
        }

        let mut summary = PassSummary::new();
        summary.groups = groups.len();
        info!(
            target: "reconcile",
            pass_id = %summary.pass_id,
            listings = active.len(),
            groups = groups.len(),
            "starting reconciliation pass"
        );

        let fetches = groups.iter().map(|(key, ids)| async move {
            let query = ListingQuery::for_group(key, self.per_page);
            (key, ids, self.source.fetch_listings(&query).await)
        });
        let results = join_all(fetches).await;

        let now = Utc::now();
        let mut outcomes = Vec::with_capacity(snapshot.len());
        for (key, ids, result) in results {
            let page = match result {
                Ok(page) => page,
                Err(err) => {
                    summary.failed_groups += 1;
                    warn!(
                        target: "reconcile",
                        pass_id = %summary.pass_id,
                        group = %key,
                        error = %err,
                        "listing query failed, group left unchanged"
                    );
                    continue;
                }
            };

            debug!(
                target: "reconcile",
                pass_id = %summary.pass_id,
                group = %key,
                batch = page.data.len(),
                "batch received"
            );

            for id in ids {
                let classification = classify(&page.data, *id, now, self.stale_after);
                debug!(
                    target: "reconcile",
                    pass_id = %summary.pass_id,
                    %id,
                    status = %classification.status,
                    reason = %classification.reason,
                    "listing classified"
                );
                summary.checked += 1;
                outcomes.push(match classification.found {
                    Some(listing) => ListingOutcome::Found {
                        id: *id,
                        listing: listing.clone(),
                        fulfilled: classification.status == ListingStatus::Fulfilled,
                    },
                    None => {
                        summary.expired.push(*id);
                        ListingOutcome::Expired { id: *id }
                    }
                });
            }
        }

        summary.newly_fulfilled = self.favorites.apply_outcomes(&outcomes).await;

        if !summary.newly_fulfilled.is_empty() {
            info!(
                target: "reconcile",
                pass_id = %summary.pass_id,
                ids = ?summary.newly_fulfilled,
                "favorites became fulfilled"
            );
            if self.favorites.sound_enabled().await {
                self.play_alert().await;
                summary.alerted = true;
            }
        }

        info!(
            target: "reconcile",
            pass_id = %summary.pass_id,
            checked = summary.checked,
            fulfilled = summary.newly_fulfilled.len(),
            expired = summary.expired.len(),
            failed_groups = summary.failed_groups,
            "reconciliation pass finished"
        );
        PassReport::Completed(summary)
    }

    /// Stop whatever alert is still playing.
    pub fn stop_alert(&self) {
        if let Some(handle) = self.take_playing() {
            debug!(target: "reconcile", "stopping playing alert");
            handle.stop();
        }
    }

    async fn play_alert(&self) {
        self.stop_alert();
        let handle = self.alert.play().await;
        *self.playing_slot() = handle;
    }

    fn take_playing(&self) -> Option<AlertHandle> {
        self.playing_slot().take()
    }

    fn playing_slot(&self) -> std::sync::MutexGuard<'_, Option<AlertHandle>> {
        self.playing.lock().unwrap_or_else(|poisoned| {
            warn!(target: "reconcile", "alert mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Ids of `listings` keyed by the query that covers them.
pub fn group_by_key<'a>(
    listings: impl IntoIterator<Item = &'a TrackedListing>,
) -> BTreeMap<GroupKey, Vec<ListingId>> {
    let mut groups: BTreeMap<GroupKey, Vec<ListingId>> = BTreeMap::new();
    for listing in listings {
        groups.entry(listing.group_key()).or_default().push(listing.id);
    }
    groups
}
