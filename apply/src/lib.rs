//! One reconciliation cycle over a set of resources.
//!
//! Every resource is read and diffed before any remote call is made, so a
//! rejected configuration leaves the endpoint untouched. Operations are then
//! applied resource by resource, ids of created objects are recorded, and
//! the refreshed state is read back into each record.

mod input;
mod update;

pub use crate::input::{PlanInput, ResourceInput, ResourceOutput};
pub use crate::update::{AppUpdate, PlannedChange, writeln_update};

use thiserror::Error;
use tokio::io::AsyncWrite;
use tracing::{debug, info};
use vsphere_client::Client;
use vsphere_operation::{Applied, OperationApplyError};
use vsphere_params::ParamValidationErrors;
use vsphere_resource::{
    Environment, Resource, ResourceChangeError, ResourceKind, ResourceRecordError,
    ResourceStateError, changes_to_operations, query_states, resources_to_changes,
};

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("invalid configuration for resource {index} ({kind}): {source}")]
    Validation {
        index: usize,
        kind: ResourceKind,
        source: ParamValidationErrors,
    },

    #[error(transparent)]
    ResourceState(#[from] ResourceStateError),

    #[error(transparent)]
    ResourceChange(#[from] ResourceChangeError),

    #[error(transparent)]
    ResourceRecord(#[from] ResourceRecordError),

    #[error(transparent)]
    OperationApply(#[from] OperationApplyError),

    #[error("failed to output JSON: {0}")]
    JsonOutput(#[source] serde_json::Error),

    #[error("failed to write output: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to flush output: {0}")]
    Flush(#[source] std::io::Error),
}

/// Validate every input, naming the first invalid one by position.
pub fn resources_from_input(inputs: Vec<ResourceInput>) -> Result<Vec<Resource>, ApplyError> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(index, input)| {
            let kind = input.kind;
            input
                .into_resource()
                .map_err(|source| ApplyError::Validation {
                    index,
                    kind,
                    source,
                })
        })
        .collect()
}

/// Run one cycle, writing progress to `out`, and return the new records.
pub async fn apply<W>(
    client: &dyn Client,
    env: &Environment,
    mut resources: Vec<Resource>,
    out: &mut W,
) -> Result<Vec<ResourceOutput>, ApplyError>
where
    W: AsyncWrite + Unpin,
{
    info!(count = resources.len(), version = %env.version, "starting");

    let states = query_states(client, &resources).await?;
    debug!(?states, "resource states");

    let changes = resources_to_changes(&mut resources, &states, env)?;
    debug!(?changes, "resource changes");

    let planned = changes_to_operations(changes);
    if planned.is_empty() {
        info!("No changes to apply!");
    } else {
        let changes = planned
            .iter()
            .map(|(index, operations)| PlannedChange {
                index: *index,
                kind: resources[*index].kind.to_string(),
                operations: operations.iter().map(ToString::to_string).collect(),
            })
            .collect();
        writeln_update(out, &AppUpdate::Changes { changes }).await?;
    }

    for (index, operations) in planned {
        for operation in operations {
            let name = operation.to_string();
            writeln_update(
                out,
                &AppUpdate::OperationStart {
                    index,
                    operation: name.clone(),
                },
            )
            .await?;

            let created = match operation.apply(client, env.task_timeout).await? {
                Applied::Done => None,
                Applied::Created(created) => {
                    let resource = &mut resources[index];
                    let id = resource.created_id(&created);
                    info!(%id, kind = %resource.kind, "created");
                    resource.data.set_id(id.clone());
                    Some(id)
                }
            };

            writeln_update(
                out,
                &AppUpdate::OperationComplete {
                    index,
                    operation: name,
                    created,
                },
            )
            .await?;
        }
    }

    // Re-read after applying so records reflect what the endpoint reports.
    let states = query_states(client, &resources).await?;
    for (resource, state) in resources.iter_mut().zip(&states) {
        resource.record(state, env)?;
    }

    let outputs: Vec<ResourceOutput> = resources.iter().map(ResourceOutput::from).collect();
    writeln_update(
        out,
        &AppUpdate::Recorded {
            resources: outputs.clone(),
        },
    )
    .await?;

    info!("Apply completed");
    Ok(outputs)
}
