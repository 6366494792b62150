//! Shared types for the auth-recovery workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
