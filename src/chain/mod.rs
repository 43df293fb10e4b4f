//! 调用与调用链的数据模型

mod types;

pub use types::{Call, CallChain};
