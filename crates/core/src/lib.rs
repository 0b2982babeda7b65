//! WatchParty core
//!
//! Transport-agnostic pieces of the watch-party synchronization engine:
//! the canonical playback record, playhead extrapolation, the JSON wire
//! protocol, the session repository with its durable backends, and the
//! per-viewer client synchronizer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         watchparty-core                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌────────────────┐   apply()   ┌──────────────────────────────┐ │
//! │  │ protocol       │────────────▶│ store::SessionRepository     │ │
//! │  │ (ClientMessage │             │ (cache + dyn DurableStore)   │ │
//! │  │  ServerMessage)│             └──────────────┬───────────────┘ │
//! │  └───────▲────────┘                            │ persist (queue) │
//! │          │                                     ▼                 │
//! │  ┌───────┴────────┐             ┌──────────────────────────────┐ │
//! │  │ client::       │             │ MemoryStore / SqliteStore    │ │
//! │  │ ClientSync...  │             └──────────────────────────────┘ │
//! │  └────────────────┘                                              │
//! │          clock::extrapolate(): pure playhead derivation          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod clock;
pub mod error;
pub mod handle;
pub mod protocol;
pub mod session;
pub mod store;

pub use client::{ClientState, ClientSynchronizer, Reaction, SyncTolerances};
pub use clock::{extrapolate, Clock, ManualClock, SystemClock};
pub use error::{ClientSyncError, ProtocolError, SessionError, StorageError};
pub use handle::ClientHandle;
pub use protocol::{Action, ClientMessage, EndNotice, ErrorNotice, ServerMessage, SyncMessage};
pub use session::WatchPartySession;
pub use store::{DurableStore, MemoryStore, PersistErrorHook, SessionRepository, SqliteStore};
