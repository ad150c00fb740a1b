//! avlink - Device connectivity core for a home AV setup
//!
//! This library provides:
//! - A long-lived telnet client for a Denon/Marantz-style AVR with a
//!   deterministic simulated fallback
//! - LAN discovery and heuristic candidate scoring for AVR and TV endpoints
//! - Protocol-level validation of scored candidates
//! - A thin JSON HTTP surface for the upstream resolver layer

pub mod api;
pub mod config;
pub mod discovery;
pub mod net;
pub mod session;
pub mod settings;
