//! # System Interaction Layer
//!
//! This module provides abstractions for interacting with the host operating system and
//! the container runtime. It is the boundary between the session/provisioning logic and
//! process management.
//!
//! ## Modules
//!
//! - **`executor`**: spawns one external command at a time, echoes it with a tag, passes
//!   its output through and reports its exit status. Honours the cancellation flag.
//! - **`runtime`**: the `ContainerRuntime` trait (create, copy in, exec, remove) and its
//!   implementation over the `docker`/`podman` CLI.
//! - **`signals`**: turns SIGINT/SIGTERM/SIGHUP into the shared cancellation flag.

pub mod executor;
pub mod runtime;
pub mod signals;
