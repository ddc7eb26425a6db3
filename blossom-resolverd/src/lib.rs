pub mod api;
pub mod config;
pub mod directory;
pub mod directory_manager;
pub mod relay;
pub mod resolver;
pub mod transport;
