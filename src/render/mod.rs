//! # Rendering: the seam to the external render command.
//!
//! - [`Render`] trait implemented by [`CommandRenderer`] (and test doubles)
//! - [`RenderedArtifact`] owns the per-attempt output file
//! - [`FailureLog`] keeps the latest [`FailureRecord`] per program

mod failure;
mod renderer;

pub use failure::{FailureLog, FailureRecord, MAX_CAPTURED_OUTPUT};
pub use renderer::{CommandRenderer, Render, RenderRequest, RenderedArtifact};
