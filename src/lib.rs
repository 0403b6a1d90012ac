// Configuration
pub mod config;

// Inbound event decoding
pub mod event;

// Customer location state and aggregates
pub mod state;

// Single-writer hub: channels, rooms, fan-out
pub mod hub;

// Customer name lookups
pub mod enrichment;

// Daily reset clock
pub mod schedule;

// WebSocket connections and wire protocol
pub mod subscription;

// HTTP and WebSocket APIs
pub mod api;
