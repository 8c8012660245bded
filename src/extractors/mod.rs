//! Request extractors.

pub mod viewer;
pub use viewer::{Viewer, USER_ID_HEADER};
