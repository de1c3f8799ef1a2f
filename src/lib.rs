pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod input;
pub mod maze;
pub mod rng;
pub mod selector;
pub mod server_protocol;
pub mod server_utils;
pub mod session_state;
pub mod session_store;
pub mod task_repository;
pub mod types;
