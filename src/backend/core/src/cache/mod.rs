//! Ephemeral TTL cache backing the process lock.
//!
//! The cache holds exactly one kind of state in Conveyor: the worker's
//! mutual-exclusion lock entry. The backend is pluggable:
//!
//! - **MemoryCache**: in-process entries with lazy expiry, for tests and
//!   single-process deployments
//! - **RedisCache**: Redis `SET PX [NX]`, for deployments where worker
//!   invocations land on different processes
//!
//! Expired entries read as absent everywhere; callers never observe a stale
//! entry.

pub mod backend;

pub use backend::{CacheBackend, MemoryCache, RedisCache};
