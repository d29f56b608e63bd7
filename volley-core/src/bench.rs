use std::sync::Arc;

use crate::call::CallSpec;
use crate::grpc::{CallInvoker, ChannelSet, ConnectOptions, InvokeOptions, TlsConfig};
use crate::message::{MessageBuilder, MessageSource};
use crate::runner::{self, CancelToken, ProgressFn, RunConfig, RunReport, run_pool};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Method(#[from] crate::call::Error),

    #[error(transparent)]
    Message(#[from] crate::message::Error),

    #[error(transparent)]
    Grpc(#[from] crate::grpc::Error),

    #[error(transparent)]
    Runner(#[from] runner::Error),
}

/// Runs one benchmark: connects, drives the worker pool against the target
/// method, and returns the aggregated report.
///
/// Configuration problems (bad config combination, malformed static
/// template, unreachable target, bad metadata) fail here before any call is
/// dispatched. After that the only `Err` paths are fatal runtime failures;
/// per-call outcomes are data in the report. `cancel` may be triggered from
/// anywhere at any time and yields a `Cancelled` report.
pub async fn run(
    spec: CallSpec,
    source: MessageSource,
    config: RunConfig,
    tls: Option<TlsConfig>,
    progress: Option<ProgressFn>,
    cancel: Arc<CancelToken>,
) -> Result<RunReport> {
    config.validate()?;

    let builder = Arc::new(MessageBuilder::new(spec.method.input(), source)?);

    let connect = ConnectOptions {
        connect_timeout: config.connect_timeout,
        tls,
    };
    let channels = ChannelSet::connect(&spec.target, connect, config.connections).await?;

    let invoker = Arc::new(CallInvoker::new(
        Arc::new(spec),
        builder,
        channels,
        InvokeOptions {
            timeout: config.call_timeout,
            stream_messages: config.stream_messages,
        },
    )?);

    let handler = {
        let cancel = Arc::clone(&cancel);
        move |ticket| {
            let invoker = Arc::clone(&invoker);
            let cancel = Arc::clone(&cancel);
            async move { invoker.invoke(ticket, &cancel).await }
        }
    };

    Ok(run_pool(&config, handler, cancel, progress).await?)
}
