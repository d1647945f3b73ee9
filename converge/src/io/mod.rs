//! Side-effecting edges: process execution, shell commands, config and
//! declaration files.

pub mod config;
pub mod declaration;
pub mod process;
pub mod shell;
