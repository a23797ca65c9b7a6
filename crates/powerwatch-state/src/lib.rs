//! powerwatch-state — the shared state store behind powerwatch.
//!
//! Appliance power flags and dwell bookkeeping live in a remote-style
//! key/value tree addressed by `/`-separated paths. The engine only talks to
//! it through the [`SharedStore`] trait (`get`, `set`, `delete`, `update`),
//! so the backing service can be swapped without touching decision logic.
//!
//! # Backends
//!
//! - [`RedbStore`]: embedded [redb](https://docs.rs/redb) database, on disk
//!   or in memory (the latter doubles as the fake used in tests).
//! - [`RestStore`]: the Firebase Realtime Database REST dialect over
//!   HTTP/1.1 (`GET`/`PUT`/`DELETE /<path>.json`, `PATCH /.json`).
//!
//! # Tree semantics
//!
//! Values are JSON. Reading a parent path returns an object assembled from
//! its children, so `get("appliances")` yields the whole appliance snapshot.
//! Writing an object flattens it into leaves; writing `null` deletes.

pub mod error;
pub mod layout;
pub mod redb_store;
pub mod rest;
pub mod store;
pub mod tables;

pub use error::{StoreError, StoreResult};
pub use layout::{DwellRecord, Layout, PowerEncoding, PowerState};
pub use redb_store::RedbStore;
pub use rest::RestStore;
pub use store::{SharedStore, StoreFuture};
