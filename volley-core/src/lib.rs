mod bench;
mod call;
mod grpc;
mod message;
mod value;

pub mod runner;

pub use bench::{Error, Result, run};
pub use call::{CallShape, CallSpec, Error as CallError, GrpcMethod};
pub use grpc::{
    CallInvoker, ChannelSet, ConnectOptions, Error as GrpcError, InvokeOptions, TlsConfig,
    TransportErrorKind,
};
pub use message::{CallSeed, Error as MessageError, GeneratorFn, MessageBuilder, MessageSource};
pub use value::{MapKey, MapMap, ObjectMap, Value};
