//! Database initialization, schema and runtime settings

pub mod init;
pub mod settings;

pub use init::*;
pub use settings::*;
