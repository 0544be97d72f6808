//! query module - ServerQuery transport engine

mod client;
mod codec;
mod command;
mod events;
mod frame;
mod response;

pub use client::{
    ClientOptions, QueryClient, State, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT,
    DEFAULT_READ_TIMEOUT, MAX_LINE_LENGTH,
};
pub use codec::{
    escape, escape_map, escape_opt, parse_multi, parse_once, parse_payload, unescape, Record,
    Value,
};
pub use command::{Command, QUIT};
pub use events::EventQueue;
pub use frame::{split_command, COMMAND_SPLIT, LINE_TERMINATOR};
pub use response::{
    classify, LineKind, QueryResult, ResponseEnvelope, Status, EVENT_MARKER, GREETING_MARKER,
    STATUS_PREFIX, SUCCESS,
};
