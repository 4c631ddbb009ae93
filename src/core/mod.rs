pub mod error;
pub mod message;
pub mod util;
pub mod validations;
