// murmur: interaction sync and notification fan-out for a social feed
//
// This is the library root. Server side: the store (db), counters, the
// notification engine (notify), the event bus and the interaction service
// that ties them together. Client side: sessions, the toggle controller
// and per-view comment aggregation (client).

pub mod bus;
pub mod client;
pub mod config;
pub mod counters;
pub mod db;
pub mod error;
pub mod interactions;
pub mod notify;
pub mod status;

#[cfg(feature = "web")]
pub mod web;
