//! CLI subcommand implementations.

pub mod aggregate;
pub mod import;
pub mod show;
pub mod status;
pub mod top;
pub mod watch;
