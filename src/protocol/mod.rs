//! Postgres wire protocol: the startup prefix only
//!
//! The proxy never speaks the query protocol itself. It needs to frame an
//! `SSLRequest`, encode a startup message and recognise the first message a
//! client sends.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;
mod startup;

pub use decode::decode_initial_message;
pub use encode::encode_message;
pub use message::{FrontendMessage, InitialMessage};
pub use startup::{StartupParameters, StartupParametersBuilder};
