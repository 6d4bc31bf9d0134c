pub mod constants;
pub mod error;
pub mod ics;
pub mod parameters;

pub use constants::*;
pub use error::*;
pub use ics::*;
pub use parameters::*;
