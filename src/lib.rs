//! # Fablekit - Interactive Fiction with Durable Save Games
//!
//! Fablekit models an interactive fiction world as an owned graph of regions, rooms,
//! exits, items and characters, and can save and restore a game in progress without
//! losing the host-authored callbacks attached to that graph.
//!
//! ## Features
//!
//! - **Spatial Grid**: Regions and rooms placed on integer coordinates; adjacency is
//!   computed, never stored. Door pairs lock and unlock together.
//! - **Snapshot Codec**: Order-preserving tree encoding; decoding syncs collections by
//!   stable id into an existing skeleton.
//! - **Behavior Reattachment**: Callbacks are never persisted. After a load they are
//!   copied from the previously live graph by matching key.
//! - **Background I/O**: Saves and loads run on a blocking worker; the foreground only
//!   polls and swaps in the finished graph.
//! - **Slot Stores**: Atomic per-slot files or an embedded sled tree, with sha256
//!   integrity checks and optional gzip.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fablekit::demo;
//! use fablekit::session::Session;
//! use fablekit::storage::FileSlotStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(FileSlotStore::new("./saves")?);
//!     let (mut session, _signals) = Session::new(demo::world_builder(), store)?;
//!
//!     session.begin_save("quick")?;
//!     if let Some(done) = session.wait().await {
//!         println!("{}", done.message);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`fiction`] - entities, spatial model, snapshot codec, reattachment
//! - [`session`] - save/load orchestration and host signals
//! - [`storage`] - snapshot envelopes, byte transforms, slot stores
//! - [`config`] - TOML configuration
//! - [`validation`] - slot name validation and safe filenames
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Session       │ ← Foreground owner of the live game
//! └─────────────────┘
//!          │ encode / catalog
//! ┌─────────────────┐
//! │   Fiction       │ ← Graph, codec, reattachment
//! └─────────────────┘
//!          │ bytes (worker)
//! ┌─────────────────┐
//! │   Storage       │ ← Envelopes and slots
//! └─────────────────┘
//! ```

pub mod config;
pub mod demo;
pub mod fiction;
pub mod logutil;
pub mod metrics;
pub mod session;
pub mod storage;
pub mod validation;
