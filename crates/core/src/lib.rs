pub mod access;
pub mod address_pool;
pub mod backing;
pub mod command;
pub mod config;
pub mod context;
pub mod destroy;
pub mod epoch;
pub mod platform;
pub mod resource;
