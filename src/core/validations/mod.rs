pub mod error;
pub mod message;
pub mod worker;

pub use error::ValidationError;
