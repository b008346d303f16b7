pub mod chain;
pub mod config;
pub mod events;
pub mod query;
pub mod repository;
pub mod rpc;
pub mod scanner;
