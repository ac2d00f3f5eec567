// src/core/mod.rs

pub mod config_loader;
pub mod paths;
pub mod provisioner;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;
