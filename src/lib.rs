pub mod cli;
pub mod daemon;
pub mod errors;
pub mod manager;
pub mod models;
pub mod registry;
pub mod server;
pub mod store;
