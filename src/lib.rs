//! Redis-wire-compatible in-memory cache.
//!
//! The data plane is a byte-accounted LRU map backed by an optional
//! append-only key-value log: hot entries stay in memory, evicted entries
//! spill to disk and are rehydrated on a miss. Clients speak the RESP
//! array-of-bulk-strings dialect over TCP. A consistent-hash router can
//! front several in-process cache workers behind one endpoint.

pub mod cache;
pub mod client;
pub mod persist;
pub mod resp;
pub mod server;
