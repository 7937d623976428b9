//! Configuration: channel mappings and runtime settings.

pub mod env;
pub mod parser;
pub mod types;
pub mod validate;

pub use env::Settings;
pub use parser::MappingSource;
pub use types::*;
