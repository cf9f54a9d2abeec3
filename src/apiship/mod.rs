pub mod client;
pub mod error;
pub mod models;
pub mod token;

pub use client::{ApiMode, Client};
pub use token::{MemoryTokenStore, TokenManager, TokenStore, TomlTokenStore};
