//! Security guards for text entering persistent memory.
//!
//! Every piece of text is treated as hostile until proven otherwise:
//! [`Sanitizer`] neutralizes known injection patterns and enforces the
//! per-entry budget, and [`Anchor`] detects drift away from the session's
//! original task intent. Sanitization is known-pattern only and explicitly
//! advisory and is not a defense against novel adaptive attacks.

pub mod anchor;
pub mod sanitizer;

pub use anchor::{Anchor, DriftCheck};
pub use sanitizer::{SanitizeFlag, SanitizeOutcome, Sanitizer};
