use tracing::warn;
use vsphere_machine::{DISTRIBUTED_VIRTUAL_SWITCH_TYPE, VIRTUAL_MACHINE_TYPE};

use crate::InventoryClient;

/// Resolve a UUID to a managed object id for the entity types that have one.
///
/// A failed lookup is not an error: `id` is assumed to already be a managed
/// object id. Other entity types pass through unchanged.
pub async fn resolve_moid<C>(client: &C, entity_type: &str, id: &str) -> String
where
    C: InventoryClient + ?Sized,
{
    let found = match entity_type {
        VIRTUAL_MACHINE_TYPE => client.virtual_machine_by_uuid(id).await,
        DISTRIBUTED_VIRTUAL_SWITCH_TYPE => client.distributed_switch_by_uuid(id).await,
        _ => return id.to_string(),
    };
    match found {
        Ok(reference) => reference.value,
        Err(error) => {
            warn!(entity_type, id, %error, "lookup failed, treating id as managed object id");
            id.to_string()
        }
    }
}
