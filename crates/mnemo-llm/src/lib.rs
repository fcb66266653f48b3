//! Concrete [`LlmAdapter`](mnemo_core::adapter::LlmAdapter) implementations.
//!
//! Adapters live outside the memory core and are injected at construction.
//! They are blocking, honor a per-call deadline, and perform no network I/O
//! beyond their configured endpoint. [`FakeAdapter`] is the deterministic
//! double used throughout the test suites.

pub mod anthropic;
pub mod fake;
pub mod gemini;

pub use anthropic::AnthropicAdapter;
pub use fake::FakeAdapter;
pub use gemini::GeminiAdapter;
