//! WatchParty sync server
//!
//! Keeps every viewer of a watch party on the same playhead. Viewers talk a
//! small JSON protocol over a WebSocket; a single engine task applies each
//! message to the session record, writes it through to durable storage and
//! fans the new state out to the session's other viewers.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                      watchparty-sync-server                       │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                                                                   │
//! │  ┌──────────────────┐                                             │
//! │  │  HTTP API (axum) │ ← POST /api/sessions                        │
//! │  │                  │ ← GET  /api/sessions/:id                    │
//! │  │                  │ ← GET  /ws  (upgrade)                       │
//! │  └────────┬─────────┘                                             │
//! │           │ EngineCommand                                         │
//! │           ▼                                                       │
//! │  ┌──────────────────┐   ┌───────────────────┐   ┌──────────────┐  │
//! │  │  SyncEngine      │──▶│ SessionRepository │──▶│ DurableStore │  │
//! │  │  (single task)   │   │ (cache)           │   │ (SQLite)     │  │
//! │  └────────┬─────────┘   └───────────────────┘   └──────────────┘  │
//! │           │ per-session fan-out                                   │
//! │           ▼                                                       │
//! │  ┌──────────────────────────────────────────────────────────────┐ │
//! │  │  ConnectionRegistry → bounded outbound queue per WebSocket   │ │
//! │  └──────────────────────────────────────────────────────────────┘ │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod storage;
pub mod ws;
