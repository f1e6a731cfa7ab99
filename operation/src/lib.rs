use async_trait::async_trait;
use std::fmt::{Debug, Display};
use std::time::Duration;
use thiserror::Error;
use vsphere_client::Client;

pub mod operations;

use crate::operations::machine::{Machine, MachineOperation};
use crate::operations::snapshot::{Snapshot, SnapshotOperation};
use crate::operations::vnic::{Vnic, VnicOperation};

/// OperationType specifies how to merge and apply a concrete Operation type.
///
/// Operations are the results of resource changes. Each type decides how to
/// merge same-type operations and how to apply them against a client.
#[async_trait]
pub trait OperationType {
    type Operation: Display + Send + Sync;

    /// Merge a set of operations of this type.
    /// Implementations should coalesce operations to a minimal, ordered set.
    fn merge(operations: Vec<Self::Operation>) -> Vec<Self::Operation>;

    type ApplyError;

    /// Apply an operation of this type, waiting at most `task_timeout` for
    /// each remote task it starts.
    async fn apply(
        client: &dyn Client,
        task_timeout: Duration,
        operation: &Self::Operation,
    ) -> Result<Applied, Self::ApplyError>;
}

/// What applying an operation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Done,
    /// Id of a newly created remote object.
    Created(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Machine(MachineOperation),
    Snapshot(SnapshotOperation),
    Vnic(VnicOperation),
}

impl From<MachineOperation> for Operation {
    fn from(value: MachineOperation) -> Self {
        Operation::Machine(value)
    }
}

impl From<SnapshotOperation> for Operation {
    fn from(value: SnapshotOperation) -> Self {
        Operation::Snapshot(value)
    }
}

impl From<VnicOperation> for Operation {
    fn from(value: VnicOperation) -> Self {
        Operation::Vnic(value)
    }
}

impl Operation {
    /// Merge a set of operations by type.
    pub fn merge(operations: Vec<Operation>) -> Vec<Operation> {
        let OperationsByType {
            machine,
            snapshot,
            vnic,
        } = partition_by_type(operations);

        let mut result = Vec::new();

        result.extend(Machine::merge(machine).into_iter().map(Operation::Machine));
        result.extend(Snapshot::merge(snapshot).into_iter().map(Operation::Snapshot));
        result.extend(Vnic::merge(vnic).into_iter().map(Operation::Vnic));

        result
    }
}

#[derive(Error, Debug)]
pub enum OperationApplyError {
    #[error("virtual machine operation failed: {0}")]
    Machine(<Machine as OperationType>::ApplyError),

    #[error("snapshot operation failed: {0}")]
    Snapshot(<Snapshot as OperationType>::ApplyError),

    #[error("vnic operation failed: {0}")]
    Vnic(<Vnic as OperationType>::ApplyError),
}

impl Operation {
    /// Apply an operation by type.
    pub async fn apply(
        &self,
        client: &dyn Client,
        task_timeout: Duration,
    ) -> Result<Applied, OperationApplyError> {
        match self {
            Operation::Machine(op) => Machine::apply(client, task_timeout, op)
                .await
                .map_err(OperationApplyError::Machine),
            Operation::Snapshot(op) => Snapshot::apply(client, task_timeout, op)
                .await
                .map_err(OperationApplyError::Snapshot),
            Operation::Vnic(op) => Vnic::apply(client, task_timeout, op)
                .await
                .map_err(OperationApplyError::Vnic),
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Operation::*;
        match self {
            Machine(op) => Display::fmt(op, f),
            Snapshot(op) => Display::fmt(op, f),
            Vnic(op) => Display::fmt(op, f),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationsByType {
    machine: Vec<MachineOperation>,
    snapshot: Vec<SnapshotOperation>,
    vnic: Vec<VnicOperation>,
}

fn partition_by_type(operations: Vec<Operation>) -> OperationsByType {
    let mut machine = Vec::new();
    let mut snapshot = Vec::new();
    let mut vnic = Vec::new();
    for operation in operations {
        match operation {
            Operation::Machine(op) => machine.push(op),
            Operation::Snapshot(op) => snapshot.push(op),
            Operation::Vnic(op) => vnic.push(op),
        }
    }
    OperationsByType {
        machine,
        snapshot,
        vnic,
    }
}
