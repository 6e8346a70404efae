#![forbid(unsafe_code)]

//! Bounded cache primitives for a GPU-accelerated terminal renderer.
//!
//! `termtile-core` is the host-agnostic data-structure layer underneath the
//! texture-atlas crate. It owns the pieces that share one discipline: fixed
//! capacity, wrap-around reuse, and addresses that stay stable while an entry
//! is alive.
//!
//! # Primary responsibilities
//!
//! - **StrongHash**: 128-bit content fingerprint used as the sole cache key.
//! - **StrongLruTable**: fixed-capacity hash table with LRU eviction that
//!   hands every live entry a dense, stable `entry_index`.
//! - **Ring**: cyclic sequence with a movable origin and O(1) rotation.
//! - **Scrollback**: bounded line history built on [`Ring`], rotating and
//!   overwriting once full.
//!
//! # Design principles
//!
//! - **No I/O**: pure data + logic; hosts drive everything.
//! - **Deterministic**: fingerprints and eviction order are reproducible
//!   across runs and platforms.
//! - **Single owner**: no internal locking; higher layers serialize access.

pub mod lru;
pub mod ring;
pub mod scrollback;
pub mod strong_hash;

pub use lru::{StrongLruTable, TableStats};
pub use ring::Ring;
pub use scrollback::Scrollback;
pub use strong_hash::StrongHash;
