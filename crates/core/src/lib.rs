//! Domain types and pure logic for design-token extraction.
//!
//! Nothing in this crate performs I/O of its own. Collaborators that do
//! (renderers, vision services, stores) are expressed as traits here and
//! implemented in the outer crates.

pub mod checkpoint;
pub mod collaborators;
pub mod error;
pub mod hashing;
pub mod retry;
pub mod styles;
pub mod tokens;
pub mod types;
pub mod validation;
pub mod visual;
