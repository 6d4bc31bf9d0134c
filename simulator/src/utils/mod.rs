pub mod error;
pub mod io;
pub mod shape;
pub mod transform;
