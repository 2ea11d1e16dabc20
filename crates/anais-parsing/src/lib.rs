//! Text-level building blocks for the migration pipeline.
//!
//! Nothing in this crate performs I/O: page windows are selected from
//! already-extracted page text, cleaning is purely lexical, and AI responses
//! are parsed from strings.

pub mod clean;
pub mod response;
pub mod window;

pub use clean::{clean_text, has_encoding_damage};
pub use response::{ResponseError, extract_json, extract_json_payload};
pub use window::{PageWindows, WindowConfig, head_window, select_windows, tail_window};
