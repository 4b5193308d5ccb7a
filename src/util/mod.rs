pub mod clock;
pub(crate) mod join;
pub mod telemetry;

pub use clock::*;
pub use telemetry::*;
