pub mod client;
pub mod commands;
pub mod error;
pub mod worker;
