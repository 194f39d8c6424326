// SPDX-License-Identifier: GPL-3.0-or-later

//! Fulfillment/expiry inference for a tracked listing.
//!
//! The API offers no "is this party full" field, so status is inferred from a
//! same-category, same-datacenter batch in server order:
//! 1. Target missing (or empty batch): expired
//! 2. Find the first position where `time_left` drops below its predecessor
//! 3. Target at or after that boundary: fulfilled, before it: active
//! 4. No boundary: fulfilled only if the target's `updated_at` is older than
//!    the staleness threshold

use chrono::{DateTime, Duration, Utc};
use pfwatch_domain::{Listing, ListingId, ListingStatus};

/// Staleness threshold used when a batch shows no boundary.
pub fn default_stale_after() -> Duration {
    Duration::minutes(5)
}

/// Why a listing was given its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationReason {
    EmptyBatch,
    Missing,
    AtOrAfterBoundary { position: usize, boundary: usize },
    BeforeBoundary { position: usize, boundary: usize },
    Stale { age_secs: i64 },
    Fresh { age_secs: i64 },
    NoTimestamp,
}

impl std::fmt::Display for ClassificationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBatch => write!(f, "query returned no listings"),
            Self::Missing => write!(f, "listing absent from batch"),
            Self::AtOrAfterBoundary { position, boundary } => {
                write!(f, "position {} >= boundary {}", position, boundary)
            }
            Self::BeforeBoundary { position, boundary } => {
                write!(f, "position {} < boundary {}", position, boundary)
            }
            Self::Stale { age_secs } => write!(f, "no boundary, updated {}s ago", age_secs),
            Self::Fresh { age_secs } => write!(f, "no boundary, updated {}s ago", age_secs),
            Self::NoTimestamp => write!(f, "no boundary and no update timestamp"),
        }
    }
}

/// Result of classifying one target against one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification<'a> {
    pub status: ListingStatus,
    /// The target's record in the batch, if present.
    pub found: Option<&'a Listing>,
    pub reason: ClassificationReason,
}

/// Index of the first listing whose `time_left` is lower than the one before it.
pub fn find_fulfillment_boundary(batch: &[Listing]) -> Option<usize> {
    batch
        .windows(2)
        .position(|pair| pair[1].time_left < pair[0].time_left)
        .map(|i| i + 1)
}

/// Classify `target` within `batch`, which must be in the order the server returned it.
pub fn classify(
    batch: &[Listing],
    target: ListingId,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Classification<'_> {
    if batch.is_empty() {
        return Classification {
            status: ListingStatus::Expired,
            found: None,
            reason: ClassificationReason::EmptyBatch,
        };
    }

    let Some(position) = batch.iter().position(|listing| listing.id == target) else {
        return Classification {
            status: ListingStatus::Expired,
            found: None,
            reason: ClassificationReason::Missing,
        };
    };
    let found = &batch[position];

    let (status, reason) = match find_fulfillment_boundary(batch) {
        Some(boundary) if position >= boundary => (
            ListingStatus::Fulfilled,
            ClassificationReason::AtOrAfterBoundary { position, boundary },
        ),
        Some(boundary) => (
            ListingStatus::Active,
            ClassificationReason::BeforeBoundary { position, boundary },
        ),
        None => match found.updated_at {
            Some(updated_at) => {
                let age = now.signed_duration_since(updated_at);
                if age > stale_after {
                    (
                        ListingStatus::Fulfilled,
                        ClassificationReason::Stale {
                            age_secs: age.num_seconds(),
                        },
                    )
                } else {
                    (
                        ListingStatus::Active,
                        ClassificationReason::Fresh {
                            age_secs: age.num_seconds(),
                        },
                    )
                }
            }
            None => (ListingStatus::Active, ClassificationReason::NoTimestamp),
        },
    };

    Classification {
        status,
        found: Some(found),
        reason,
    }
}
