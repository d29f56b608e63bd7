use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};

use crate::call::{CallShape, CallSpec};
use crate::message::{CallSeed, MessageBuilder};
use crate::runner::{CallResult, CallStatus, CallTicket, CancelToken};

use super::codec::RawCodec;
use super::{ChannelSet, Error, Result, TransportErrorKind};

#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Per-call deadline, measured from dispatch. Exceeding it drops the
    /// in-flight exchange (tonic resets the underlying HTTP/2 stream).
    pub timeout: Option<Duration>,
    /// Messages sent per client/bidi streaming call. Fixture sources default
    /// to one pass over the list, everything else to a single message.
    pub stream_messages: Option<usize>,
}

/// Performs one logical call per `invoke`, dispatching over the four call
/// shapes. Shared read-only across all workers.
pub struct CallInvoker {
    spec: Arc<CallSpec>,
    builder: Arc<MessageBuilder>,
    channels: ChannelSet,
    metadata: MetadataMap,
    opts: InvokeOptions,
}

enum Payload {
    Single(Bytes),
    Stream(Vec<Bytes>),
}

struct ExchangeOk {
    bytes_received: u64,
    messages_received: u64,
}

enum Waited {
    Done(std::result::Result<ExchangeOk, CallStatus>),
    TimedOut,
    Cancelled,
}

impl CallInvoker {
    /// Metadata templates are parsed here once, so malformed headers fail
    /// before the run starts.
    pub fn new(
        spec: Arc<CallSpec>,
        builder: Arc<MessageBuilder>,
        channels: ChannelSet,
        opts: InvokeOptions,
    ) -> Result<Self> {
        let mut metadata = MetadataMap::new();
        for (k, v) in &spec.metadata {
            let key = MetadataKey::from_bytes(k.as_bytes())
                .map_err(|_| Error::MetadataKey(k.clone()))?;
            let value =
                MetadataValue::try_from(v.as_str()).map_err(|_| Error::MetadataValue {
                    key: k.clone(),
                    value: v.clone(),
                })?;
            metadata.insert(key, value);
        }

        Ok(Self {
            spec,
            builder,
            channels,
            metadata,
            opts,
        })
    }

    /// Performs one call attempt. Per-call failures (remote status, transport
    /// breakage, timeout, cancellation) come back as data in the
    /// `CallResult`; an `Err` is a fatal configuration problem that must
    /// abort the run. No retries: every attempt is final.
    pub async fn invoke(&self, ticket: CallTicket, cancel: &CancelToken) -> Result<CallResult> {
        let seed = CallSeed {
            seq: ticket.seq,
            worker: ticket.worker,
        };
        let shape = self.spec.shape();

        // Payload construction stays off the measured exchange.
        let payload = match shape {
            CallShape::Unary | CallShape::ServerStream => {
                Payload::Single(self.builder.next(&seed)?)
            }
            CallShape::ClientStream | CallShape::BidiStream => {
                Payload::Stream(self.builder.stream_batch(&seed, self.opts.stream_messages)?)
            }
        };
        let bytes_sent = match &payload {
            Payload::Single(b) => b.len() as u64,
            Payload::Stream(msgs) => msgs.iter().map(|b| b.len() as u64).sum(),
        };

        let started = Instant::now();
        let fut = self.exchange(ticket.worker, shape, payload);
        tokio::pin!(fut);

        let waited = match self.opts.timeout {
            Some(timeout) => tokio::select! {
                out = &mut fut => Waited::Done(out),
                _ = tokio::time::sleep(timeout) => Waited::TimedOut,
                _ = cancel.cancelled() => Waited::Cancelled,
            },
            None => tokio::select! {
                out = &mut fut => Waited::Done(out),
                _ = cancel.cancelled() => Waited::Cancelled,
            },
        };
        let elapsed = started.elapsed();

        let (status, bytes_received, messages_received) = match waited {
            Waited::Done(Ok(ok)) => (CallStatus::Ok, ok.bytes_received, ok.messages_received),
            Waited::Done(Err(status)) => (status, 0, 0),
            Waited::TimedOut => (CallStatus::Timeout, 0, 0),
            Waited::Cancelled => (CallStatus::Canceled, 0, 0),
        };

        Ok(CallResult {
            seq: ticket.seq,
            worker: ticket.worker,
            offset: ticket.offset,
            elapsed,
            status,
            bytes_sent,
            bytes_received,
            messages_received,
        })
    }

    async fn exchange(
        &self,
        worker: u64,
        shape: CallShape,
        payload: Payload,
    ) -> std::result::Result<ExchangeOk, CallStatus> {
        let channel = self.channels.for_worker(worker);
        let mut grpc = tonic::client::Grpc::new(channel);
        grpc.ready()
            .await
            .map_err(|_| CallStatus::Transport(TransportErrorKind::ChannelNotReady))?;

        let path = self.spec.method.path().clone();

        // The payload variant is fixed by the shape above, so matching on the
        // payload keeps this exhaustive without phantom arms.
        match payload {
            Payload::Single(bytes) if shape == CallShape::Unary => {
                let response = grpc
                    .unary(self.request(bytes), path, RawCodec)
                    .await
                    .map_err(remote_status)?;

                Ok(ExchangeOk {
                    bytes_received: response.into_inner().0 as u64,
                    messages_received: 1,
                })
            }
            Payload::Single(bytes) => {
                let response = grpc
                    .server_streaming(self.request(bytes), path, RawCodec)
                    .await
                    .map_err(remote_status)?;

                // One CallResult covers the whole exchange, however many
                // messages the server sends.
                let mut stream = response.into_inner();
                let mut ok = ExchangeOk {
                    bytes_received: 0,
                    messages_received: 0,
                };
                while let Some(size) = stream.message().await.map_err(remote_status)? {
                    ok.bytes_received += size.0 as u64;
                    ok.messages_received += 1;
                }
                Ok(ok)
            }
            Payload::Stream(msgs) if shape == CallShape::ClientStream => {
                // The iterator ending closes the send side; tonic then waits
                // for the single response.
                let response = grpc
                    .client_streaming(self.request(tokio_stream::iter(msgs)), path, RawCodec)
                    .await
                    .map_err(remote_status)?;

                Ok(ExchangeOk {
                    bytes_received: response.into_inner().0 as u64,
                    messages_received: 1,
                })
            }
            Payload::Stream(msgs) => {
                // tonic drives the request stream while we drain responses,
                // so send and receive progress independently; a silent server
                // only stalls until the per-call deadline fires.
                let response = grpc
                    .streaming(self.request(tokio_stream::iter(msgs)), path, RawCodec)
                    .await
                    .map_err(remote_status)?;

                let mut stream = response.into_inner();
                let mut ok = ExchangeOk {
                    bytes_received: 0,
                    messages_received: 0,
                };
                while let Some(size) = stream.message().await.map_err(remote_status)? {
                    ok.bytes_received += size.0 as u64;
                    ok.messages_received += 1;
                }
                Ok(ok)
            }
        }
    }

    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        *request.metadata_mut() = self.metadata.clone();

        // Propagate the deadline to the server as grpc-timeout as well; the
        // local timer in `invoke` is what aborts the exchange.
        if let Some(timeout) = self.opts.timeout {
            request.set_timeout(timeout);
        }

        request
    }
}

fn remote_status(status: tonic::Status) -> CallStatus {
    CallStatus::Grpc(status.code() as u16)
}
