pub mod analysis;
pub mod app;
pub mod catalog;
pub mod cli;
pub mod completion;
pub mod config;
pub mod executor;
pub mod model;
pub mod output;
pub mod sources;
pub mod traits;

// Re-export common types for convenience
pub use executor::*;
pub use model::*;
pub use traits::*;
