//! Pure pipeline steps that need no I/O.
//!
//! ```text
//! elements ──▶ render ──▶ Markdown        source key ──▶ naming ──▶ output key
//! ```
//!
//! 1. [`render`] — flatten elements into one Markdown document
//! 2. [`naming`] — derive the output key from the source key
//!
//! Both are deterministic functions of their input, which is what makes
//! repeated runs for the same source target the same output object.

pub mod naming;
pub mod render;
