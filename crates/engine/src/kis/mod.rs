//! Korea Investment & Securities open-API integration.

pub mod rest;
pub mod token;

pub use rest::{KisBroker, KisConfig};
pub use token::{TokenCache, TokenKey};
