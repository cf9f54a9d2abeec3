pub mod address;
pub mod apiship;
pub mod cache;
pub mod calculator;
pub mod calendar;
pub mod config;
pub mod currency;
pub mod delivery;
pub mod error;
pub mod rates;
pub mod rules;
pub mod settings;

pub use calculator::{Calculator, Env, Order, Outcome, RequestContext, Summary};
pub use error::{Error, Result};
