mod calculator;
mod lists;
mod token;

pub use calculator::*;
pub use lists::*;
pub use token::*;
