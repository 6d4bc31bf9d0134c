pub mod diagnostics;
pub mod fields;
pub mod ics;
pub mod particles;
pub mod pusher;
pub mod simulation_object;
pub mod utils;
