//! Common types shared by the InPost Buy SDK crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
