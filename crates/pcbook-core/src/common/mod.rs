pub mod error;
mod filter;
pub mod types;

pub use error::{Error, Result};
