//! Typed shapes of the vSphere objects that the reconciliation core reads
//! and writes.

mod config;
mod enums;
mod guest;
mod hardware;
mod host;
mod info;
mod reference;
mod snapshot;

pub use crate::config::*;
pub use crate::enums::*;
pub use crate::guest::*;
pub use crate::hardware::*;
pub use crate::host::*;
pub use crate::info::*;
pub use crate::reference::*;
pub use crate::snapshot::*;
