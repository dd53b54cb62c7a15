// src/watch/mod.rs

//! File watching: glob patterns, debouncing, and the notify-backed watcher.
//!
//! - [`patterns`] compiles the watch pattern grammar.
//! - [`debounce`] collapses bursts of raw events per task.
//! - [`watcher`] owns the OS watcher and per-task registrations.

pub mod debounce;
pub mod patterns;
pub mod watcher;

pub use debounce::DEBOUNCE_WINDOW;
pub use patterns::WatchPatterns;
pub use watcher::FileWatcher;
