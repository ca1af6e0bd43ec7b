pub mod models;
pub mod services;
pub mod error;
pub mod mocks;

pub use models::*;
pub use error::*;
pub use services::*;
