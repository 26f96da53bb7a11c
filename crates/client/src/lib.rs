//! # Vaultwire Client Library
//!
//! Interactive client for the Vaultwire secure session protocol. The
//! protocol state machine lives in the `protocol` crate; this crate supplies
//! the pieces around it:
//!
//! - **Transport**: blocking TCP connection to the server
//! - **Session Store**: persisted login credential for session resumption
//! - **Prompt**: terminal interaction and credential validation
//! - **Runner**: the orchestration loop tying the above to the engine
//! - **Config**: TOML configuration with environment overrides

pub mod config;
pub mod prompt;
pub mod runner;
pub mod store;
pub mod transport;

pub use config::Config;
pub use prompt::{Interactive, StdinPrompt};
pub use runner::SessionRunner;
pub use store::{FileSessionStore, SessionStore};
pub use transport::{TcpTransport, Transport};
