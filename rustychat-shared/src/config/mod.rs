//! # Configuration
//!
//! Client-side configuration: connection endpoints, SSE tuning, and cache
//! sizing knobs. Loaded from defaults, an optional TOML file, and
//! `RUSTYCHAT_*` environment overrides, in that order.

pub mod client;

pub use client::{CacheConfig, ClientConfig, ConfigError, SseConfig};
