// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tether: a weighted link graph stored in an ordered key-value store.
//!
//! Repeated co-occurrence of two nodes shrinks the distance between them;
//! reads rank neighbors by that distance. Every logical edge is stored twice,
//! once from each end, so either node can list its neighbors with one scan.
//!
//! # Layers
//!
//! - [`codec`]: edge identity to and from `id` / `base` key strings.
//! - [`store`]: the [`EdgeStore`] contract; [`memory`] implements it in process.
//! - [`link`]: bidirectional overwrite-or-accumulate writes, reads, deletes.
//! - [`traverse`]: multi-hop nearest-neighbor path search.
//! - [`coalesce`]: merges bursts of writes before flushing them.
//! - [`graph`]: the [`Graph`] and [`Partition`] façades.
//!
//! # Atomicity
//!
//! The store guarantees single-row atomicity only. The two rows of an edge are
//! written independently; a failure between them leaves one row written and
//! is reported to the caller as [`GraphError::Store`].
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

pub mod coalesce;
pub mod codec;
pub mod edge;
pub mod error;
pub mod graph;
pub mod link;
pub mod memory;
pub mod request;
pub mod settings;
pub mod store;
pub mod traverse;

pub use coalesce::{process_coalesced_writes, CoalesceOptions, CoalesceReport, Coalescer};
pub use codec::{compose_base, compose_id, parse_id, scan_prefix, Direction, ParsedId};
pub use edge::{DeletedEdge, Edge, LinkedEdge};
pub use error::{GraphError, GraphResult, ValidationError};
pub use graph::{Graph, Partition};
pub use link::LinkWriter;
pub use memory::MemoryEdgeStore;
pub use request::{
    AllAllRequest, ClosestRequest, CrossLinkRequest, EdgeRequest, LinkInput, LinkRequest,
    NodeRequest,
};
pub use settings::GraphSettings;
pub use store::{
    DistanceQuery, DistanceRange, DistanceUpdate, DistanceWrite, EdgeRow, EdgeStore, StoreError,
    StoreResult,
};
pub use traverse::{
    Frequency, HopJob, HopResolver, PathStep, RemoteHops, TraversalPath, TraversalResult,
    TraverseRequest,
};
