//! # quiver-store
//!
//! Content-addressed, immutable storage for tool artifacts.
//!
//! Every SQL template, plugin script, and dashboard body in Quiver is an
//! artifact: a textual blob keyed by the SHA-256 digest of its body.
//! Artifacts are written once and never mutated; updating a tool re-points
//! its registry row at a new digest. This keeps tool/artifact references
//! one-way and acyclic, and lets the dispatcher re-hash on every load to
//! detect registry drift or storage corruption.

pub mod digest;
pub mod error;
pub mod rows;
pub mod store;

pub use digest::Digest;
pub use error::StoreError;
pub use store::{Artifact, ArtifactKind, ArtifactStore};
