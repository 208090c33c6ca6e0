//! One module per subcommand.

pub mod add;
#[cfg(feature = "audit-log")]
pub mod audit_cmd;
pub mod completions;
pub mod list;
pub mod pending;
pub mod remove;
pub mod show;
pub mod sync;
pub mod update;
