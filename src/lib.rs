//! HTTP relay for AI-assisted product photography.
//!
//! Accepts a text concept plus reference product images, forwards them to a
//! Gemini model, and returns either a generated image or a placeholder card
//! describing the shot. A second endpoint suggests prompt ideas for a set of
//! product images.

pub mod ai;
pub mod app;
pub mod error;
pub mod models;
pub mod placeholder;
pub mod prompts;
pub mod retry;
pub mod server;

pub use error::{Error, Result};
