mod gate;
mod version;

pub use crate::gate::*;
pub use crate::version::*;
