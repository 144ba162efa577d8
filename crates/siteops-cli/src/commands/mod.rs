pub mod auth_cmd;
pub mod capture;
pub mod common;
pub mod completions;
pub mod prune;
pub mod queue;
pub mod status;
pub mod sync;
pub mod watch;
