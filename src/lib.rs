//! Collaborative stroke synchronization engine.
//!
//! Many users draw onto one shared tile at the same time. Each session keeps
//! its own in-progress strokes responsive locally, flushes them to the shared
//! document with replace-by-owner writes, and reconciles every document
//! version it observes (its own echoes included) against the edits it has not
//! persisted yet.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`stroke`] | Stroke and tile types, validation, timestamps |
//! | [`codec`] | Tolerant decoding of persisted tiles |
//! | [`hit`] | Which stroke is under the pointer |
//! | [`buffer`] | The in-memory stroke list and its pending-write bookkeeping |
//! | [`erase`] | Owner-restricted eraser |
//! | [`reconcile`] | Merge of a remote tile with local pending strokes |
//! | [`listener`] | Tile subscription task with re-subscription |
//! | [`persist`] | Flush: the session's only write path |
//! | [`session`] | [`session::DrawSession`], the surface a host drives |
//! | [`store`] | [`store::TileStore`] with in-memory and Postgres backends |
//! | [`timer`] | Cancellable repeating and one-shot timers |
//! | [`notify`] | Notices and their per-kind throttle |
//! | [`identity`] | Identity, wallet capability, tip handler |
//! | [`input`] | Tools, palette, tooltip and render records |
//! | [`config`] | [`config::SyncConfig`] from environment variables |
//! | [`error`] | [`error::ErrorCode`] shared by error enums |

pub mod buffer;
pub mod codec;
pub mod config;
pub mod erase;
pub mod error;
pub mod hit;
pub mod identity;
pub mod input;
pub mod listener;
pub mod notify;
pub mod persist;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod stroke;
pub mod timer;

pub use config::SyncConfig;
pub use session::DrawSession;
pub use stroke::{Point, Stroke, Tile, TileKey};
