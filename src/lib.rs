pub mod assistant;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod model;
pub mod normalizer;
pub mod provider;
pub mod registry;
pub mod server;
pub mod session;
pub mod source;
pub mod timer;
pub mod transport;
