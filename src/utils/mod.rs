pub use flag::*;
pub use time::*;

mod flag;
pub mod logger;
mod time;
