mod client;
mod codec;
mod error;
mod invoke;

pub use client::{ChannelSet, ConnectOptions, TlsConfig};
pub use error::{Error, Result, TransportErrorKind};
pub use invoke::{CallInvoker, InvokeOptions};
