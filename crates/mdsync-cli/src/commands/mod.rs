pub mod common;
pub mod completions;
pub mod forget;
pub mod init;
pub mod pull;
pub mod resolve;
pub mod status;
pub mod sync;
pub mod verify;
pub mod watch;
