//! CLI command modules.

pub mod command;
pub mod link;
pub mod listen;
