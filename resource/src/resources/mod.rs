pub mod dynamic;
pub mod snapshot;
pub mod virtual_machine;
pub mod vnic;
