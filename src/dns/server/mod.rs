// Server core (§4.7): the UDP listener/dispatcher/queue-monitor thread
// trio, zone dispatch by longest-origin-suffix match, and the handling
// pipeline (TSIG verify, zone dispatch, chain-sign). See `core` for the
// concurrency machinery and `crate::dns::handler` for the pluggable
// per-zone handler chain.

pub mod core;

pub use core::{ManagedZone, Server, ServerConfig, ZoneHandling};
