//! Privileged execution and the per-OS elevation policy.
//!
//! - `executor`: [`PrivilegedExecutor`] trait and the `pkexec` implementation
//! - `policy`: [`ElevationPolicy`] routing filesystem mutations directly or
//!   through the executor

pub mod executor;
pub mod policy;

#[cfg(test)]
pub(crate) mod mocks;

pub use executor::{
    CommandOutput, ElevationError, PkexecExecutor, PrivilegedCommand, PrivilegedExecutor,
};
pub use policy::{default_policy, DirectPolicy, ElevatedPolicy, ElevationPolicy, FsOp, MutationError};
