//! Error taxonomy for the placement solver, in the style of
//! `objectio-common::error::Error`: one `thiserror` variant per
//! precondition-violation or infeasibility case a caller needs to
//! distinguish, plus an escape hatch for anything not yet enumerated.

use thiserror::Error;

use crate::ids::PDiskId;

/// Everything [`crate::mapper::GroupMapper`] can return from a failed call.
#[derive(Debug, Error)]
pub enum MapperError {
    /// The supplied `GroupDefinition` does not match the group's geometry.
    #[error("incorrect existing group")]
    IncorrectExistingGroup,

    /// A PDiskId named by the existing group is not in the registry.
    #[error("existing group contains missing PDiskId# {0}")]
    MissingPDisk(PDiskId),

    /// The same PDiskId appears twice in the existing group.
    #[error("group contains duplicate PDiskId# {0}")]
    DuplicatePDisk(PDiskId),

    /// No feasible placement exists at any score threshold. Carries the
    /// diagnostic PDisk dump produced by
    /// [`crate::mapper::format_diagnostics`].
    #[error("no group options {0}")]
    NoGroupOptions(String),

    /// Anything that doesn't fit the cases above.
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MapperError>;
