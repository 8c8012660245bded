//! HTTP handlers for the content read surface.

pub mod views;
pub use views::*;
