pub mod client;
pub mod constants;
pub mod error;
pub mod grid;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod sync_engine;
pub mod types;
