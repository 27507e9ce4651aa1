//! Chat sessions and the event handlers that drive them.
//!
//! # Architecture
//!
//! - [`SessionContext`]: per-session state (the bound remote thread)
//! - [`SessionStore`]: live sessions held by the host, each with its own
//!   transcript and event channel
//! - [`SessionHandler`]: the session-start and message-received handlers
//!
//! # Example
//!
//! ```rust
//! use agent_relay::session::SessionContext;
//!
//! let mut ctx = SessionContext::new("session-1");
//! assert!(ctx.thread_id().is_none());
//! ctx.bind_thread("thread_abc");
//! assert_eq!(ctx.thread_id(), Some("thread_abc"));
//! ```

mod context;
mod handler;
mod store;

pub use context::SessionContext;
pub use handler::{HandlerSettings, MessageOutcome, SessionHandler};
pub use store::{Session, SessionGuard, SessionStore};
