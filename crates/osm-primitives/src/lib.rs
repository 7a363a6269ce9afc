//! In-memory core for map-editable entities ("primitives").
//!
//! This crate provides the common state shared by every editable map object:
//! a bit-packed lifecycle/state field, a copy-on-write key/value tag store
//! that is readable without locks while being mutated, and a
//! configuration-driven policy layer that classifies tag keys as
//! interesting, discardable, or work-in-progress.
//!
//! # Overview
//!
//! The design targets one sharing pattern: arbitrarily many concurrent
//! readers (rendering, filtering, search) against a single logical writer
//! (the editing layer). Tag mutations build an entirely new immutable
//! snapshot and publish it with one atomic reference swap, so readers always
//! observe a complete tag set and never take a lock. Flag and identity
//! fields are individually atomic; consistency across fields is the writer's
//! responsibility.
//!
//! What differs per concrete entity kind (node, way, relation) is injected
//! at construction rather than inherited: an [`IdGenerator`] hands out
//! process-unique negative ids for objects the server does not know yet, and
//! a [`TagChangeHook`] is invoked after every tag mutation so the owning
//! kind can recompute derived flags from the new tag contents.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use osm_primitives::{DerivedFlagsHook, Primitive, UniqueIdGenerator};
//!
//! let generator = Arc::new(UniqueIdGenerator::new());
//! let primitive = Primitive::new(generator, Arc::new(DerivedFlagsHook));
//! assert!(primitive.is_new());
//!
//! primitive.put("highway", Some("residential"));
//! primitive.put("source", Some("survey"));
//! assert!(primitive.is_tagged());
//! assert_eq!(primitive.interesting_tags().len(), 1);
//!
//! primitive.set_osm_id(42, 1)?;
//! assert_eq!(primitive.id(), 42);
//! # Ok::<(), osm_primitives::PrimitiveError>(())
//! ```
//!
//! # Modules
//!
//! - [`model`]: Flags, identity metadata, tag storage, users, [`Primitive`]
//! - [`classify`]: Tag key classification and its process-wide cache
//! - [`codec`]: Binary snapshot encoding/decoding with compression support
//! - [`error`]: Error types
//! - [`limits`]: Security limits for decoding
//!
//! # Concurrency
//!
//! All operations are synchronous and never block. Readers are lock-free on
//! every path. Writers must serialize with each other externally; two
//! unsynchronized writers may lose an update, which is a documented
//! limitation of the store, not a bug. Compound flag transitions may be
//! observed half-applied by a concurrent reader.

pub mod classify;
pub mod codec;
pub mod error;
pub mod limits;
pub mod model;

// Re-export commonly used types at crate root
pub use classify::{TagClassifier, TagConfig};
pub use codec::{
    decode_snapshot, encode_snapshot, encode_snapshot_compressed, PrimitiveSnapshot,
};
pub use error::{DecodeError, EncodeError, ErrorKind, PrimitiveError};
pub use model::{
    DerivedFlagsHook, IdGenerator, Keys, Primitive, TagChangeHook, TagMap, TagStore,
    UniqueIdGenerator, User, UserRegistry, UserStore,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
