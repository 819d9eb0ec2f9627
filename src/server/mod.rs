//! Server Lifecycle Module
//!
//! Wires the tracker and the HTTP surface into a running process:
//! load checkpoint, open files, initialize the tracker, bind the listener,
//! serve requests, and shut down cleanly once all work is complete (or a
//! termination signal or fatal I/O error arrives).
//!
//! ## Submodules
//! - **`config`**: Runtime configuration resolved from the command line.
//! - **`lifecycle`**: Bind/serve/drain/close plus the completion watcher.

pub mod config;
pub mod lifecycle;
