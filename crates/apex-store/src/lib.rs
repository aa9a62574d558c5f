//! Module A — the embedded ordered key-value store (spec §4.A).
//!
//! A single ordered mapping from string key to byte value, backed by
//! `sled`: lexicographic key ordering, prefix/range scans, and
//! single-writer serializable transactions over one on-disk file.
//! Re-opening the same path recovers state exactly, since that
//! guarantee is `sled`'s own durability contract.

mod handle;
mod ops;

pub use handle::StoreHandle;
pub use ops::{Op, OpResult};
