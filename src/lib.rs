//! ts3query - TeamSpeak 3 ServerQuery transport engine
//!
//! - Escaping and record parsing for the line-based query protocol
//! - A client that frames commands, collects responses and buffers notifications
//! - Sessions for instance-level and server-level work
//! - The file transfer side channel

pub mod config;
pub mod debug;
pub mod error;
pub mod query;
pub mod session;
pub mod transfer;

pub use config::Config;
pub use debug::DebugLog;
pub use error::{Error, QueryError, Result, SessionError};
pub use query::{ClientOptions, Command, QueryClient, QueryResult, Record, Value};
pub use session::{AdminSession, NotifyEvent, ServerSelector, ServerSession, Session};
pub use transfer::TransferChannel;
