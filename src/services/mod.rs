// src/services/mod.rs
pub mod client;
pub mod db;
pub mod locks;
pub mod parser;
pub mod session;
pub mod task;
