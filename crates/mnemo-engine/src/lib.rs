//! The write protocol and read path of the mnemo memory layer.
//!
//! [`ContextManager`] is the façade callers hold: it buffers session
//! messages, fires the [`Observer`] when the buffered token count crosses
//! its threshold, lets the [`Reflector`] consolidate the log when it grows
//! past its own threshold, and assembles the two-block context string whose
//! stable prefix keeps provider prompt caches warm.

pub mod context_builder;
pub mod manager;
pub mod observer;
pub mod reflector;

pub use context_builder::ContextBuilder;
pub use manager::{ContextManager, RunCompletion};
pub use observer::Observer;
pub use reflector::Reflector;
