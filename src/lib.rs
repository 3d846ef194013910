//! Client-side Rust SDK for gatekit, a feature gating and experimentation service.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that serves feature gates and dynamic configs for a single
//! [`User`] at a time. Evaluation happens on the server: on [`Client::initialize()`] the client
//! fetches a [`Snapshot`] of already-evaluated results for the user, and every lookup afterwards
//! is a local hash map read.
//!
//! Looking up a gate or a config logs an exposure event. Exposures and custom events (see
//! [`Client::log_event()`]) are buffered by an [`EventQueue`] and delivered in batches, either when
//! the batch is full or when the flush interval elapses, whichever comes first. Call
//! [`Client::shutdown()`] before exiting to deliver buffered events.
//!
//! The last fetched snapshot is persisted in a [`KeyValueStore`], so that subsequent cold starts
//! serve last-known-good values even before (or without) a successful network round trip.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Lookups and event logging never fail: until a snapshot is available, gates are off and configs
//! are absent. Fetch failures are reported through [`InitHandle`] and are usually only worth
//! logging.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages, under the `gatekit` target. Consider integrating a `log`-compatible logger
//! implementation for better visibility into SDK operations.
//!
//! # Examples
//!
//! Examples can be found in the `demos` directory of the `gatekit` crate repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod cache;
mod client;
mod config;
mod error;
mod event_queue;
mod events;
mod hashing;
mod identity;
mod init_handle;
mod metadata;
mod snapshot;
mod snapshot_store;
mod storage;
mod transport;
mod user;

#[cfg(test)]
mod test_utils;

pub use client::{Client, InitOptions, Readiness};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use event_queue::{EventQueue, EventQueueConfig};
pub use events::{Event, EventValue, CONFIG_EXPOSURE_EVENT, GATE_EXPOSURE_EVENT};
pub use hashing::{KeyHasher, Md5KeyHasher, PlainKeyHasher};
pub use identity::{IdentityProvider, RandomIdentityProvider};
pub use init_handle::InitHandle;
pub use metadata::SdkMetadata;
pub use snapshot::{ConfigEvaluation, DynamicConfig, GateEvaluation, Snapshot, TryParse};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::{Endpoint, HttpTransport, Transport};
pub use user::{AttributeValue, Attributes, User};
