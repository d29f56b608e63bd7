use bytes::Buf as _;
use bytes::BufMut as _;

/// Codec for pre-encoded request payloads.
///
/// Requests are already wire-ready protobuf produced by the message builder,
/// and responses only matter by size, so neither direction touches
/// descriptors: sending is a plain byte copy and receiving just measures and
/// discards the frame.
#[derive(Clone)]
pub(crate) struct RawCodec;

/// Size of one received message, in bytes. The payload itself is dropped
/// inside the decoder without being copied out of the receive buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MessageSize(pub(crate) usize);

impl tonic::codec::Codec for RawCodec {
    type Encode = bytes::Bytes;
    type Decode = MessageSize;
    type Encoder = RawEncoder;
    type Decoder = SizeDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        RawEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        SizeDecoder
    }
}

#[derive(Clone)]
pub(crate) struct RawEncoder;

impl tonic::codec::Encoder for RawEncoder {
    type Item = bytes::Bytes;
    type Error = tonic::Status;

    fn encode(
        &mut self,
        item: Self::Item,
        dst: &mut tonic::codec::EncodeBuf<'_>,
    ) -> std::result::Result<(), Self::Error> {
        dst.put_slice(item.as_ref());
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct SizeDecoder;

impl tonic::codec::Decoder for SizeDecoder {
    type Item = MessageSize;
    type Error = tonic::Status;

    fn decode(
        &mut self,
        src: &mut tonic::codec::DecodeBuf<'_>,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        let len = src.remaining();
        if len == 0 {
            return Ok(None);
        }

        src.advance(len);
        Ok(Some(MessageSize(len)))
    }
}
