// src/config/mod.rs

//! Taskfile loading and validation.
//!
//! - [`model`] is the raw TOML shape of a single taskfile.
//! - [`loader`] discovers nested taskfiles on disk and turns them into a
//!   [`crate::tasks::Tasks`] set with path-qualified IDs.
//! - [`validate`] rejects structurally broken task sets before the engine
//!   ever sees them.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load, load_and_validate, TASKFILE_NAME};
pub use model::{RawTask, RawTaskfile};
pub use validate::validate;
