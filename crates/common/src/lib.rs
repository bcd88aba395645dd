//! Shared building blocks for the portfolio auth workspace
//!
//! `Secret` keeps tokens and passwords out of logs; `Error` covers
//! configuration loading for the binaries.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
