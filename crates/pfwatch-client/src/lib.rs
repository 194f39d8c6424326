// SPDX-License-Identifier: GPL-3.0-or-later

//! Party Finder listings API client.
//!
//! Wraps the `/listings` search endpoint and the `/listing/{id}` detail
//! endpoint behind the [`ListingSource`] trait so that reconciliation can be
//! driven by a fake source in tests.

pub mod client;
pub mod error;

pub use client::{ListingSource, PartyFinderClient, PartyFinderClientBuilder};
pub use error::{ClientError, Result};
