//! Per-realm signing-key cache with fixed-TTL eviction.

pub mod entry;
pub mod manager;
