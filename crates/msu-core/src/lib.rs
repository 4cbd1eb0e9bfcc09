pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod host;
pub mod install;
pub mod io;
pub mod notify;
pub mod paths;
pub mod pending;
pub mod probe;
pub mod report;
pub mod run;
pub mod state;
pub mod status;
pub mod trigger;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{MsuError, Result};
