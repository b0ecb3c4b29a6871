pub mod application;
pub mod aws;
pub mod cli;
pub mod client;
pub mod eks;
pub mod error;
pub mod token;
pub mod transport;
