//! # tempsystem
//!
//! Creates a disposable Arch Linux container, provisions a comfortable zsh
//! environment inside it, drops the user into an interactive session and
//! removes the container once that session ends.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared flag raised by the signal bridge when the process is asked to stop.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod dev_utils;
pub mod models;
pub mod system;
