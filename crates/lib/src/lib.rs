//! wabot core library: webhook validation, identity normalization, sessions, the
//! conversation engine and the HTTP gateway used by the CLI.

pub mod channels;
pub mod config;
pub mod dialogue;
pub mod directory;
pub mod dispatch;
pub mod gateway;
pub mod handoff;
pub mod identity;
pub mod init;
pub mod session;
pub mod validate;
