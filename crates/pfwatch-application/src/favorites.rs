// SPDX-License-Identifier: GPL-3.0-or-later

//! The tracked-listing set and its persistence.
//!
//! [`FavoritesStore`] is the only writer of the set. Every mutation re-reads
//! storage, applies the change and persists the full set before returning;
//! storage failures are logged and the in-memory state stays authoritative
//! until a later write succeeds.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use pfwatch_domain::{ids_with_status, Listing, ListingId, ListingStatus, TrackedListing};
use pfwatch_infrastructure::KeyValueStore;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Storage key holding the JSON array of tracked listings.
pub const FAVORITES_KEY: &str = "ffxiv-favorites";
/// Storage key holding `"true"` / `"false"`.
pub const SOUND_ENABLED_KEY: &str = "sound-enabled";
pub const MAX_FAVORITES: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FavoritesError {
    #[error("favorites are full, at most {max} listings can be tracked")]
    CapacityReached { max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyTracked,
}

/// What one reconciliation pass learned about one tracked listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingOutcome {
    /// Present in its batch; `fulfilled` is the classifier's verdict.
    Found {
        id: ListingId,
        listing: Listing,
        fulfilled: bool,
    },
    Expired { id: ListingId },
}

impl ListingOutcome {
    pub fn id(&self) -> ListingId {
        match self {
            Self::Found { id, .. } | Self::Expired { id } => *id,
        }
    }
}

struct FavoritesState {
    listings: Vec<TrackedListing>,
    sound_enabled: bool,
    /// Cleared when a write fails; memory then stays authoritative until a write succeeds.
    follow_storage: bool,
}

/// Tracked set shared by every process using the same storage.
///
/// Each operation re-reads storage under the lock before acting, so changes
/// written by another process (e.g. `pfwatch add` while `pfwatch watch` runs)
/// are merged rather than overwritten.
#[derive(Clone)]
pub struct FavoritesStore {
    state: Arc<Mutex<FavoritesState>>,
    storage: Arc<dyn KeyValueStore>,
}

impl FavoritesStore {
    /// Restore the set from storage. Missing or unreadable data yields an empty set.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let store = Self {
            state: Arc::new(Mutex::new(FavoritesState {
                listings: Vec::new(),
                sound_enabled: false,
                follow_storage: true,
            })),
            storage,
        };

        {
            let state = store.lock_fresh().await;
            if state.listings.len() > MAX_FAVORITES {
                warn!(
                    target: "favorites",
                    stored = state.listings.len(),
                    capacity = MAX_FAVORITES,
                    "stored favorites exceed capacity, new additions are blocked until some are removed"
                );
            }
            info!(
                target: "favorites",
                count = state.listings.len(),
                sound_enabled = state.sound_enabled,
                "favorites loaded"
            );
        }
        store
    }

    pub fn capacity(&self) -> usize {
        MAX_FAVORITES
    }

    /// Start tracking `listing`. Already-tracked ids are left untouched.
    pub async fn add(&self, listing: &Listing) -> Result<AddOutcome, FavoritesError> {
        let mut state = self.lock_fresh().await;

        if state.listings.iter().any(|item| item.id == listing.id) {
            debug!(target: "favorites", id = %listing.id, "listing already tracked");
            return Ok(AddOutcome::AlreadyTracked);
        }

        if state.listings.len() >= MAX_FAVORITES {
            warn!(target: "favorites", id = %listing.id, max = MAX_FAVORITES, "favorites full");
            return Err(FavoritesError::CapacityReached { max: MAX_FAVORITES });
        }

        state
            .listings
            .push(TrackedListing::from_listing(listing, Utc::now()));
        info!(target: "favorites", id = %listing.id, name = %listing.name, "listing added to favorites");
        self.persist(&mut state).await;
        Ok(AddOutcome::Added)
    }

    /// Stop tracking `id`. Returns whether it was tracked.
    pub async fn remove(&self, id: ListingId) -> bool {
        let mut state = self.lock_fresh().await;
        let before = state.listings.len();
        state.listings.retain(|item| item.id != id);
        let removed = state.listings.len() != before;
        if removed {
            info!(target: "favorites", %id, "listing removed from favorites");
            self.persist(&mut state).await;
        }
        removed
    }

    /// Drop every fulfilled entry. Returns how many were removed.
    pub async fn clear_fulfilled(&self) -> usize {
        self.clear_where(|item| item.fulfilled, "fulfilled").await
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn clear_expired(&self) -> usize {
        self.clear_where(|item| item.expired, "expired").await
    }

    /// Empty the set. Returns how many entries were dropped.
    pub async fn clear_all(&self) -> usize {
        let mut state = self.lock_fresh().await;
        let removed = state.listings.len();
        state.listings.clear();
        info!(target: "favorites", removed, "all favorites cleared");
        self.persist(&mut state).await;
        removed
    }

    async fn clear_where(&self, predicate: impl Fn(&TrackedListing) -> bool, label: &str) -> usize {
        let mut state = self.lock_fresh().await;
        let before = state.listings.len();
        state.listings.retain(|item| !predicate(item));
        let removed = before - state.listings.len();
        info!(target: "favorites", removed, kind = label, "favorites cleared");
        self.persist(&mut state).await;
        removed
    }

    /// Commit the outcome of a reconciliation pass.
    ///
    /// Returns the ids that became fulfilled with this call. Fulfilled entries
    /// never revert; a found entry always loses its expired flag. Outcomes for
    /// ids removed in the meantime are ignored.
    pub async fn apply_outcomes(&self, outcomes: &[ListingOutcome]) -> Vec<ListingId> {
        if outcomes.is_empty() {
            return Vec::new();
        }

        let mut state = self.lock_fresh().await;
        let mut newly_fulfilled = Vec::new();
        let mut touched = false;

        for outcome in outcomes {
            let Some(entry) = state.listings.iter_mut().find(|item| item.id == outcome.id()) else {
                debug!(target: "favorites", id = %outcome.id(), "outcome for untracked listing ignored");
                continue;
            };
            touched = true;

            match outcome {
                ListingOutcome::Found {
                    listing, fulfilled, ..
                } => {
                    entry.refresh_from(listing);
                    entry.expired = false;
                    if *fulfilled && !entry.fulfilled {
                        entry.fulfilled = true;
                        newly_fulfilled.push(entry.id);
                    }
                }
                ListingOutcome::Expired { .. } => {
                    entry.expired = true;
                }
            }
        }

        if touched {
            self.persist(&mut state).await;
        }
        newly_fulfilled
    }

    pub async fn snapshot(&self) -> Vec<TrackedListing> {
        self.lock_fresh().await.listings.clone()
    }

    /// Entries still eligible for polling.
    pub async fn active(&self) -> Vec<TrackedListing> {
        self.lock_fresh()
            .await
            .listings
            .iter()
            .filter(|item| item.is_active())
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: ListingId) -> Option<TrackedListing> {
        self.lock_fresh()
            .await
            .listings
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.lock_fresh().await.listings.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_favorite(&self, id: ListingId) -> bool {
        self.get(id).await.is_some()
    }

    pub async fn is_fulfilled(&self, id: ListingId) -> bool {
        self.get(id).await.is_some_and(|item| item.fulfilled)
    }

    pub async fn is_expired(&self, id: ListingId) -> bool {
        self.get(id).await.is_some_and(|item| item.expired)
    }

    pub async fn fulfilled_ids(&self) -> HashSet<ListingId> {
        ids_with_status(&self.lock_fresh().await.listings, ListingStatus::Fulfilled)
    }

    pub async fn expired_ids(&self) -> HashSet<ListingId> {
        ids_with_status(&self.lock_fresh().await.listings, ListingStatus::Expired)
    }

    pub async fn sound_enabled(&self) -> bool {
        self.lock_fresh().await.sound_enabled
    }

    pub async fn set_sound_enabled(&self, enabled: bool) {
        let mut state = self.lock_fresh().await;
        self.store_sound(&mut state, enabled).await;
    }

    /// Flip the sound preference and return the new value.
    pub async fn toggle_sound(&self) -> bool {
        let mut state = self.lock_fresh().await;
        let enabled = !state.sound_enabled;
        self.store_sound(&mut state, enabled).await;
        enabled
    }

    async fn store_sound(&self, state: &mut FavoritesState, enabled: bool) {
        state.sound_enabled = enabled;
        info!(target: "favorites", enabled, "sound alerts updated");
        let value = if enabled { "true" } else { "false" };
        if let Err(err) = self.storage.set(SOUND_ENABLED_KEY, value).await {
            error!(target: "favorites", error = %err, "failed to persist sound preference");
            state.follow_storage = false;
        }
    }

    async fn lock_fresh(&self) -> MutexGuard<'_, FavoritesState> {
        let mut state = self.state.lock().await;
        if state.follow_storage {
            self.reload(&mut state).await;
        }
        state
    }

    /// Replace the in-memory copy with what storage holds. Read failures keep the current copy.
    async fn reload(&self, state: &mut FavoritesState) {
        match self.storage.get(FAVORITES_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<TrackedListing>>(&raw) {
                Ok(listings) => state.listings = dedupe(listings),
                Err(err) => {
                    error!(target: "favorites", error = %err, "stored favorites are unreadable, keeping current set");
                }
            },
            Ok(None) => state.listings.clear(),
            Err(err) => {
                error!(target: "favorites", error = %err, "failed to read favorites, keeping current set");
            }
        }

        match self.storage.get(SOUND_ENABLED_KEY).await {
            Ok(value) => state.sound_enabled = value.as_deref() == Some("true"),
            Err(err) => {
                error!(target: "favorites", error = %err, "failed to read sound preference");
            }
        }
    }

    async fn persist(&self, state: &mut FavoritesState) {
        let raw = match serde_json::to_string(&state.listings) {
            Ok(raw) => raw,
            Err(err) => {
                error!(target: "favorites", error = %err, "failed to serialize favorites");
                state.follow_storage = false;
                return;
            }
        };
        match self.storage.set(FAVORITES_KEY, &raw).await {
            Ok(()) => state.follow_storage = true,
            Err(err) => {
                error!(target: "favorites", error = %err, "failed to persist favorites");
                state.follow_storage = false;
            }
        }
    }
}

fn dedupe(listings: Vec<TrackedListing>) -> Vec<TrackedListing> {
    let mut seen = HashSet::new();
    let total = listings.len();
    let unique: Vec<_> = listings
        .into_iter()
        .filter(|item| seen.insert(item.id))
        .collect();
    if unique.len() != total {
        warn!(target: "favorites", dropped = total - unique.len(), "duplicate stored favorites dropped");
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::listing;
    use pfwatch_infrastructure::MemoryKeyValueStore;

    async fn empty_store() -> (FavoritesStore, MemoryKeyValueStore) {
        let storage = MemoryKeyValueStore::new();
        let store = FavoritesStore::load(Arc::new(storage.clone())).await;
        (store, storage)
    }

    struct FailingStorage;

    #[async_trait::async_trait]
    impl KeyValueStore for FailingStorage {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            anyhow::bail!("quota exceeded")
        }
    }

    #[tokio::test]
    async fn sixth_distinct_add_is_rejected() {
        let (store, _) = empty_store().await;
        for id in 1..=5 {
            assert_eq!(store.add(&listing(id, 1000)).await, Ok(AddOutcome::Added));
        }
        let before = store.snapshot().await;

        let err = store.add(&listing(6, 1000)).await.unwrap_err();

        assert_eq!(err, FavoritesError::CapacityReached { max: 5 });
        assert_eq!(store.snapshot().await, before);
        assert_eq!(store.len().await, 5);
    }

    #[tokio::test]
    async fn re_adding_does_not_duplicate_or_overwrite() {
        let (store, _) = empty_store().await;
        store.add(&listing(1, 1000)).await.unwrap();
        let original = store.get(ListingId(1)).await.unwrap();

        let mut changed = listing(1, 5);
        changed.name = "Renamed".to_string();
        assert_eq!(store.add(&changed).await, Ok(AddOutcome::AlreadyTracked));

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(ListingId(1)).await.unwrap(), original);
    }

    #[tokio::test]
    async fn already_tracked_wins_over_capacity() {
        let (store, _) = empty_store().await;
        for id in 1..=5 {
            store.add(&listing(id, 1000)).await.unwrap();
        }
        assert_eq!(store.add(&listing(3, 1000)).await, Ok(AddOutcome::AlreadyTracked));
    }

    #[tokio::test]
    async fn remove_is_noop_when_absent() {
        let (store, _) = empty_store().await;
        store.add(&listing(1, 1000)).await.unwrap();
        assert!(!store.remove(ListingId(2)).await);
        assert!(store.remove(ListingId(1)).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn clear_fulfilled_keeps_active_entries() {
        let (store, _) = empty_store().await;
        for id in 1..=3 {
            store.add(&listing(id, 1000)).await.unwrap();
        }
        let newly = store
            .apply_outcomes(&[
                ListingOutcome::Found {
                    id: ListingId(1),
                    listing: listing(1, 900),
                    fulfilled: true,
                },
                ListingOutcome::Found {
                    id: ListingId(3),
                    listing: listing(3, 900),
                    fulfilled: true,
                },
            ])
            .await;
        assert_eq!(newly, vec![ListingId(1), ListingId(3)]);
        let active: Vec<_> = store.active().await.iter().map(|l| l.id).collect();
        assert_eq!(active, vec![ListingId(2)]);

        assert_eq!(store.clear_fulfilled().await, 2);

        let remaining: Vec<_> = store.snapshot().await.iter().map(|l| l.id).collect();
        assert_eq!(remaining, vec![ListingId(2)]);
        assert!(store.fulfilled_ids().await.is_empty());
    }

    #[tokio::test]
    async fn clear_expired_only_removes_expired() {
        let (store, _) = empty_store().await;
        store.add(&listing(1, 1000)).await.unwrap();
        store.add(&listing(2, 1000)).await.unwrap();
        store
            .apply_outcomes(&[ListingOutcome::Expired { id: ListingId(2) }])
            .await;
        assert!(store.is_expired(ListingId(2)).await);
        assert_eq!(store.expired_ids().await.len(), 1);

        assert_eq!(store.clear_expired().await, 1);
        assert!(store.is_favorite(ListingId(1)).await);
        assert!(store.expired_ids().await.is_empty());
    }

    #[tokio::test]
    async fn clear_all_is_idempotent() {
        let (store, storage) = empty_store().await;
        store.add(&listing(1, 1000)).await.unwrap();

        store.clear_all().await;
        let first = store.snapshot().await;
        store.clear_all().await;

        assert!(first.is_empty());
        assert_eq!(store.snapshot().await, first);
        assert!(store.fulfilled_ids().await.is_empty());
        assert!(store.expired_ids().await.is_empty());
        assert_eq!(storage.get(FAVORITES_KEY).await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn fulfilled_never_reverts() {
        let (store, _) = empty_store().await;
        store.add(&listing(1, 1000)).await.unwrap();
        store
            .apply_outcomes(&[ListingOutcome::Found {
                id: ListingId(1),
                listing: listing(1, 900),
                fulfilled: true,
            }])
            .await;

        let newly = store
            .apply_outcomes(&[ListingOutcome::Found {
                id: ListingId(1),
                listing: listing(1, 3000),
                fulfilled: false,
            }])
            .await;

        assert!(newly.is_empty());
        let entry = store.get(ListingId(1)).await.unwrap();
        assert!(entry.fulfilled);
        assert_eq!(entry.time_left, 3000);
    }

    #[tokio::test]
    async fn expired_clears_when_found_again() {
        let (store, _) = empty_store().await;
        store.add(&listing(1, 1000)).await.unwrap();
        store
            .apply_outcomes(&[ListingOutcome::Expired { id: ListingId(1) }])
            .await;
        assert!(store.is_expired(ListingId(1)).await);
        assert!(!store.is_fulfilled(ListingId(1)).await);

        store
            .apply_outcomes(&[ListingOutcome::Found {
                id: ListingId(1),
                listing: listing(1, 800),
                fulfilled: false,
            }])
            .await;

        let entry = store.get(ListingId(1)).await.unwrap();
        assert!(!entry.expired);
        assert_eq!(entry.time_left, 800);
    }

    #[tokio::test]
    async fn outcomes_for_removed_listings_are_ignored() {
        let (store, _) = empty_store().await;
        store.add(&listing(1, 1000)).await.unwrap();
        let newly = store
            .apply_outcomes(&[ListingOutcome::Found {
                id: ListingId(7),
                listing: listing(7, 10),
                fulfilled: true,
            }])
            .await;
        assert!(newly.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn reload_restores_identical_entries() {
        let storage = MemoryKeyValueStore::new();
        let store = FavoritesStore::load(Arc::new(storage.clone())).await;
        let mut seen = listing(2, 1500);
        seen.updated_at = Some(Utc::now());
        store.add(&listing(1, 1000)).await.unwrap();
        store.add(&listing(2, 1400)).await.unwrap();
        store
            .apply_outcomes(&[
                ListingOutcome::Expired { id: ListingId(1) },
                ListingOutcome::Found {
                    id: ListingId(2),
                    listing: seen,
                    fulfilled: true,
                },
            ])
            .await;
        store.set_sound_enabled(true).await;

        let reloaded = FavoritesStore::load(Arc::new(storage)).await;

        assert_eq!(reloaded.snapshot().await, store.snapshot().await);
        assert!(reloaded.sound_enabled().await);
    }

    #[tokio::test]
    async fn corrupt_storage_loads_empty() {
        let storage = MemoryKeyValueStore::new();
        storage.set(FAVORITES_KEY, "{not json").await.unwrap();
        let store = FavoritesStore::load(Arc::new(storage)).await;
        assert!(store.is_empty().await);
        assert!(!store.sound_enabled().await);
    }

    #[tokio::test]
    async fn persistence_failure_keeps_memory_state() {
        let store = FavoritesStore::load(Arc::new(FailingStorage)).await;
        assert_eq!(store.add(&listing(1, 1000)).await, Ok(AddOutcome::Added));
        assert!(store.toggle_sound().await);
        assert!(store.is_favorite(ListingId(1)).await);
        assert!(store.sound_enabled().await);
    }

    #[tokio::test]
    async fn toggle_sound_round_trips() {
        let (store, storage) = empty_store().await;
        assert!(!store.sound_enabled().await);
        assert!(store.toggle_sound().await);
        assert_eq!(storage.get(SOUND_ENABLED_KEY).await.unwrap().as_deref(), Some("true"));
        assert!(!store.toggle_sound().await);
        assert_eq!(storage.get(SOUND_ENABLED_KEY).await.unwrap().as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn pass_outcomes_keep_entries_added_by_another_process() {
        let storage = MemoryKeyValueStore::new();
        let watcher = FavoritesStore::load(Arc::new(storage.clone())).await;
        let cli = FavoritesStore::load(Arc::new(storage.clone())).await;

        watcher.add(&listing(1, 1000)).await.unwrap();
        cli.add(&listing(2, 1000)).await.unwrap();
        watcher
            .apply_outcomes(&[ListingOutcome::Found {
                id: ListingId(1),
                listing: listing(1, 900),
                fulfilled: true,
            }])
            .await;

        let reloaded = FavoritesStore::load(Arc::new(storage)).await;
        let ids: Vec<ListingId> = reloaded.snapshot().await.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![ListingId(1), ListingId(2)]);
        assert!(reloaded.is_fulfilled(ListingId(1)).await);
        assert!(!reloaded.is_fulfilled(ListingId(2)).await);
    }

    #[tokio::test]
    async fn other_process_changes_are_visible_before_the_next_pass() {
        let storage = MemoryKeyValueStore::new();
        let watcher = FavoritesStore::load(Arc::new(storage.clone())).await;
        let cli = FavoritesStore::load(Arc::new(storage.clone())).await;
        watcher.add(&listing(1, 1000)).await.unwrap();

        cli.add(&listing(2, 1000)).await.unwrap();
        cli.remove(ListingId(1)).await;
        cli.set_sound_enabled(true).await;

        let active: Vec<ListingId> = watcher.active().await.iter().map(|item| item.id).collect();
        assert_eq!(active, vec![ListingId(2)]);
        assert!(watcher.sound_enabled().await);

        let newly = watcher
            .apply_outcomes(&[ListingOutcome::Expired { id: ListingId(1) }])
            .await;
        assert!(newly.is_empty());
        assert!(!cli.is_favorite(ListingId(1)).await);
    }

    #[tokio::test]
    async fn capacity_counts_entries_from_every_process() {
        let storage = MemoryKeyValueStore::new();
        let watcher = FavoritesStore::load(Arc::new(storage.clone())).await;
        let cli = FavoritesStore::load(Arc::new(storage.clone())).await;
        for id in 1..=4 {
            cli.add(&listing(id, 1000)).await.unwrap();
        }
        watcher.add(&listing(5, 1000)).await.unwrap();

        let err = cli.add(&listing(6, 1000)).await.unwrap_err();
        assert_eq!(err, FavoritesError::CapacityReached { max: MAX_FAVORITES });
        assert_eq!(watcher.capacity(), MAX_FAVORITES);
    }
}
