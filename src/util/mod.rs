//! Text helpers shared by the category model and the tree renderer.
//!
//! - **Sanitizing**: strip control characters and ANSI escapes from stored text
//! - **Excerpts**: reduce HTML summaries to plain text and shorten them by
//!   display width
//!
//! # Examples
//!
//! ```
//! use coursecat::util::{html_to_text, shorten_text, strip_control_chars};
//!
//! assert_eq!(strip_control_chars("\x1b[31mScience\x1b[0m"), "Science");
//! assert_eq!(html_to_text("<p>Optics &amp; waves</p>"), "Optics & waves");
//! assert_eq!(shorten_text("An introduction to optics", 18), "An introduction...");
//! ```

mod text;

pub use text::{html_to_text, shorten_text, strip_control_chars};
