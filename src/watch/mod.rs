//! # Change detection for the program source directory.
//!
//! [`ChangeWatcher`] observes the directory and feeds a [`Debouncer`], which
//! fires one callback per settled burst of relevant changes.

mod debounce;
mod watcher;

pub use debounce::Debouncer;
pub use watcher::{ChangeFilter, ChangeWatcher};
