pub mod assertion;
pub mod chain;
pub mod error;
pub mod expression;
pub mod http;
pub mod logger;
pub mod result;
pub mod runner;
pub mod template;
pub mod transport;
pub mod variable;

// Re-export commonly used types
pub use error::{Result, RuchainError};
