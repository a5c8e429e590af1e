//! Domain-specific errors.

use thiserror::Error;

use crate::domain::model::NodeId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),
    #[error("node {0} cannot have children")]
    NotAContainer(NodeId),
    #[error("node {child} is already attached to a parent")]
    AlreadyAttached { child: NodeId },
    #[error("appending node {child} to {parent} would create a cycle")]
    HierarchyCycle { parent: NodeId, child: NodeId },
}
