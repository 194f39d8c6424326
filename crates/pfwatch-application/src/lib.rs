// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::Arc;

use anyhow::{Context, Result};
use pfwatch_alerts::AlertPort;
use pfwatch_client::ListingSource;
use pfwatch_config::AppConfig;
use pfwatch_domain::{Listing, ListingId};
use pfwatch_infrastructure::KeyValueStore;
use tracing::{info, warn};

pub mod classifier;
pub mod favorites;
pub mod reconcile;
#[cfg(test)]
mod testing;

pub use classifier::{classify, find_fulfillment_boundary, Classification, ClassificationReason};
pub use favorites::{AddOutcome, FavoritesError, FavoritesStore, ListingOutcome, MAX_FAVORITES};
pub use reconcile::{group_by_key, PassReport, PassSummary, Reconciler};

/// Result of [`AppState::track`]: the add outcome plus the initial check, if one ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracked {
    pub outcome: AddOutcome,
    pub check: Option<PassReport>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub source: Arc<dyn ListingSource>,
    pub favorites: FavoritesStore,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Restore persisted favorites and wire up the reconciler.
    pub async fn new(
        config: AppConfig,
        source: Arc<dyn ListingSource>,
        storage: Arc<dyn KeyValueStore>,
        alert: Arc<dyn AlertPort>,
    ) -> Self {
        let favorites = FavoritesStore::load(storage).await;
        let stale_after = chrono::Duration::from_std(config.tracker.stale_after()).unwrap_or_else(|_| {
            warn!(
                target: "application",
                stale_after_secs = config.tracker.stale_after_secs,
                "staleness threshold out of range, using one day"
            );
            chrono::Duration::days(1)
        });
        let reconciler = Arc::new(Reconciler::new(
            source.clone(),
            favorites.clone(),
            alert,
            config.api.per_page,
            stale_after,
        ));
        Self {
            config,
            source,
            favorites,
            reconciler,
        }
    }

    pub async fn on_start(&self) {
        info!(
            target: "application",
            favorites = self.favorites.len().await,
            capacity = self.favorites.capacity(),
            "application state initialized"
        );
    }

    /// Add `listing` to favorites and, when configured, check it right away.
    pub async fn track(&self, listing: &Listing) -> Result<Tracked, FavoritesError> {
        let outcome = self.favorites.add(listing).await?;
        let mut check = None;
        if outcome == AddOutcome::Added && self.config.tracker.check_on_add {
            let report = self.reconciler.check_listing(listing.id).await;
            if let PassReport::Skipped = report {
                warn!(target: "application", id = %listing.id, "initial check skipped, a pass is running");
            }
            check = Some(report);
        }
        Ok(Tracked { outcome, check })
    }

    /// Look a listing up by id and track it.
    pub async fn track_by_id(&self, id: ListingId) -> Result<Tracked> {
        let listing = self
            .source
            .fetch_listing(id)
            .await
            .with_context(|| format!("failed to fetch listing {}", id))?;
        Ok(self.track(&listing).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::listing;
    use pfwatch_alerts::NoopAlert;
    use pfwatch_client::ClientError;
    use pfwatch_domain::ListingPage;
    use pfwatch_infrastructure::MemoryKeyValueStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Every listing sits alone in its group and is found with no boundary.
    #[derive(Default)]
    struct EchoSource {
        searches: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ListingSource for EchoSource {
        async fn fetch_listings(
            &self,
            _query: &pfwatch_domain::ListingQuery,
        ) -> pfwatch_client::Result<ListingPage> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            Ok(ListingPage {
                data: vec![listing(7, 900)],
                pagination: Default::default(),
            })
        }

        async fn fetch_listing(&self, id: ListingId) -> pfwatch_client::Result<Listing> {
            if id == ListingId(7) {
                Ok(listing(7, 1000))
            } else {
                Err(ClientError::NotFound(id.to_string()))
            }
        }
    }

    async fn state(check_on_add: bool) -> (AppState, Arc<EchoSource>) {
        let mut config = AppConfig::default();
        config.tracker.check_on_add = check_on_add;
        let source = Arc::new(EchoSource::default());
        let state = AppState::new(
            config,
            source.clone(),
            Arc::new(MemoryKeyValueStore::new()),
            Arc::new(NoopAlert),
        )
        .await;
        (state, source)
    }

    #[tokio::test]
    async fn track_checks_new_listing_once() {
        let (state, source) = state(true).await;

        let tracked = state.track_by_id(ListingId(7)).await.expect("track");
        assert_eq!(tracked.outcome, AddOutcome::Added);
        let Some(PassReport::Completed(summary)) = tracked.check else {
            panic!("expected a completed initial check, got {:?}", tracked.check);
        };
        assert_eq!(summary.checked, 1);
        assert_eq!(summary.groups, 1);
        assert_eq!(source.searches.load(Ordering::SeqCst), 1);
        let entry = state.favorites.get(ListingId(7)).await.expect("tracked");
        assert_eq!(entry.time_left, 900);

        let again = state.track_by_id(ListingId(7)).await.expect("track");
        assert_eq!(again.outcome, AddOutcome::AlreadyTracked);
        assert_eq!(again.check, None);
        assert_eq!(source.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn track_without_initial_check() {
        let (state, source) = state(false).await;
        let tracked = state.track(&listing(3, 100)).await.expect("track");
        assert_eq!(tracked.check, None);
        assert_eq!(source.searches.load(Ordering::SeqCst), 0);
        assert!(state.favorites.is_favorite(ListingId(3)).await);
    }

    #[tokio::test]
    async fn unknown_id_is_an_error() {
        let (state, _) = state(true).await;
        let err = state.track_by_id(ListingId(404)).await.unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(state.favorites.is_empty().await);
    }

    #[tokio::test]
    async fn configured_state_keeps_the_fixed_capacity() {
        let (state, _) = state(false).await;
        assert_eq!(state.favorites.capacity(), MAX_FAVORITES);
        for id in 1..=5 {
            state.track(&listing(id, 600)).await.expect("room left");
        }
        let err = state.track(&listing(6, 600)).await.unwrap_err();
        assert_eq!(err, FavoritesError::CapacityReached { max: 5 });
    }

    #[tokio::test]
    async fn oversized_staleness_falls_back_instead_of_panicking() {
        let mut config = AppConfig::default();
        config.tracker.stale_after_secs = u64::MAX;
        let state = AppState::new(
            config,
            Arc::new(EchoSource::default()),
            Arc::new(MemoryKeyValueStore::new()),
            Arc::new(NoopAlert),
        )
        .await;
        assert!(state.favorites.is_empty().await);
    }
}
