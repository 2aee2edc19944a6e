//! LLM provider implementations.

mod unified;

pub use unified::{ProviderKind, UnifiedProvider};
