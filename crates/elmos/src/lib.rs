pub mod arch;
pub mod builder;
pub mod config;
pub mod env;
pub mod error;
pub mod executor;
pub mod fs;
pub mod logging;
pub mod packages;
pub mod platform;
pub mod toolchain;

pub use error::{Error, Result};
