pub mod cli;
pub mod config;
pub mod error;
mod fs_atomic;
pub mod generator;
pub mod store;
pub mod template;

pub use error::{Result, SynthesisError};

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
