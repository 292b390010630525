#![forbid(unsafe_code)]

mod culture;
mod ids;
mod model;
mod schedule;
mod status;

pub use culture::*;
pub use ids::*;
pub use model::*;
pub use schedule::*;
pub use status::*;
