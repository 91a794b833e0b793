//! Session registry for ghd discussions.
//!
//! Provides:
//! - `SessionRegistry` - Create, locate and list sessions
//! - `SessionHandle` - Per-session agent state and message log access
//! - Identifier parsing (`owner/repo#N`, issue URLs, bare numbers)

pub mod error;
pub mod ident;
pub mod model;
pub mod registry;
pub mod storage;

pub use error::RegistryError;
pub use ident::{SessionIdent, SessionKey};
pub use model::{AgentState, IssueSnapshot, Session};
pub use registry::{SessionHandle, SessionRegistry};
