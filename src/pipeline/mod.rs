//! Pipeline stages for page OCR.
//!
//! Each submodule implements one transformation step, so each can be tested
//! on its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ extract ──▶ postprocess
//! (path/URL) (pdfium)   (base64)   (model)     (fences, trailer)
//! ```
//!
//! 1. [`input`]  : validate the extension and load the source bytes
//! 2. [`render`] : PDF pages to images via pdfium in `spawn_blocking`;
//!    a JPEG/PNG source is passed through as a single page
//! 3. [`encode`] : sniff the media type and base64-wrap each page
//! 4. [`extract`]: bounded concurrent model calls, one task per page, with
//!    per-page failure capture and page-order merge
//! 5. [`postprocess`]: strip code fences and append the `Page # n` trailer

pub mod encode;
pub mod extract;
pub mod input;
pub mod postprocess;
pub mod render;
