pub mod session;
pub mod types;

pub use session::Session;
pub use types::{Context, Dataset, Environment, Vars};
