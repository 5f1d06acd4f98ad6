// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for Tether crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`failing`] - Edge store that fails on demand
//! - [`recording`] - Edge store that logs every call
//! - [`fixture`] - Pre-populated graphs

pub mod config;
pub mod failing;
pub mod fixture;
pub mod recording;

pub use config::InMemoryConfigStore;
pub use failing::FailingEdgeStore;
pub use fixture::{GraphFixture, FIXTURE_TIME};
pub use recording::{RecordingEdgeStore, StoreCall};
