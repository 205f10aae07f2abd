//! Common types shared across DevBot crates.
//!
//! Every crate reports recoverable failures through [`DevbotError`] so the
//! chat orchestration can decide, per failure, whether to degrade or
//! surface it.

pub mod error;

pub use error::{DevbotError, Result};
