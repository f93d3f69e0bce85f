//! Tickdown is the document engine behind a multi-client collaborative
//! Markdown server.
//!
//! A single server process owns one shared [`Document`]: a sequence of typed
//! line chunks (headings, quotes, list items, rules, plain text) plus the
//! immutable byte snapshot published at the last *tick*. Clients submit edit
//! commands whose positions all reference that snapshot; at a fixed cadence
//! the [`engine`] drains the queue and applies the whole batch atomically:
//!
//! - deletes are validated first and merged into a coalesced range set,
//! - formatting anchors inside doomed ranges are clamped to the hole edges,
//! - the surviving commands run in timestamp order, with snapshot positions
//!   translated through a per-tick meta-log as the buffer drifts,
//! - the chunks re-flatten into a fresh snapshot and the version bumps iff
//!   anything succeeded.
//!
//! The [`broadcast`] module renders the per-tick log block the transport
//! fans out, and parses + replays it on the client side so replicas track
//! the server byte for byte. The engine itself does no I/O; the server and
//! client binaries live in their own crates.

mod check;
mod chunk;
mod document;
mod meta;
mod ops;
mod range;

pub mod broadcast;
pub mod command;
pub mod engine;

pub use chunk::{Chunk, ChunkKind};
pub use command::{CmdStatus, Command, CommandQueue, ParseError, QueuedCommand, Role, Timestamp};
pub use document::Document;
pub use ops::EditError;
pub use range::SnapRange;
