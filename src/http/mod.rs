pub mod body;
pub mod content;
pub mod request;
pub mod response;
pub mod types;

// Re-export commonly used types for convenient access
pub use body::{Body, BodyPart, PartContent};
pub use request::Request;
pub use response::Response;
pub use types::{AuthData, AuthType, ConnectionConfig, Method};
