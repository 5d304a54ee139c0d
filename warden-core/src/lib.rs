//! # Warden Core — shared primitives for the anti-abuse risk engine
//!
//! Every engine component links against this crate. It carries:
//! - **`stats`** — the pure numeric kernel (moments, percentiles, entropy,
//!   distances, EWMA). No state, no allocation beyond scratch buffers.
//! - **`store`** — the TTL-bounded, capacity-bounded keyed store that holds
//!   all per-identity state, with approximate-LRU eviction and JSON
//!   snapshot/restore.
//! - **`error`** — the shared error enum for fallible boundaries.
//!
//! Components never fail inside the hot evaluation path; anything that can
//! go wrong there degrades to a sentinel value instead. `WardenError` is
//! reserved for the edges: configuration, import/export, startup.

pub mod error;
pub mod stats;
pub mod store;

pub use error::{WardenError, WardenResult};
pub use store::{StoreStats, TtlStore};

/// Upper bound on the per-identity event list.
pub const MAX_EVENTS_PER_IDENTITY: usize = 1000;
/// Upper bound on bounded per-identity histories (profiles, fingerprints,
/// reputation entries).
pub const MAX_HISTORY: usize = 100;
