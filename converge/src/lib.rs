//! Guard-conditional evaluation for declarative resources.
//!
//! A resource may carry `only_if` / `not_if` guards. A guard is either a raw
//! command judged by its exit status, or a block run against a throwaway
//! anonymous resource whose convergence outcome is the answer.
//!
//! - **[`core`]**: Pure logic (attribute inheritance, guard translation,
//!   interpreter flags, the block statement model). No I/O.
//! - **[`resource`]**: The resource family guards run against, with the run
//!   context and type registry.
//! - **[`guard`]**: Anonymous resource construction, block evaluation and the
//!   conditionals that combine them.
//! - **[`io`]**: Process execution, config and declaration files. Isolated
//!   behind [`io::shell::CommandRunner`] so tests can script outcomes.

pub mod core;
pub mod exit_codes;
pub mod guard;
pub mod io;
pub mod logging;
pub mod resource;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
