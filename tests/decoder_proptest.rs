//! Property tests for the inbound decoder against well-formed and arbitrary input.

use bytes::Bytes;
use proptest::prelude::*;

use chunk_relay::framing::{Decoded, DecoderState, InboundFrameDecoder, ReadRequest};

const MAX_LINE: usize = 32;
const MAX_CHUNK: usize = 4096;

/// Serve reads the way the session's I/O layer does: a line stops after LF or
/// at the limit, an exact read stops short only at end of input.
fn serve(input: &mut &[u8], request: ReadRequest) -> Bytes {
    let take = match request {
        ReadRequest::Line { limit } => {
            let window = &input[..input.len().min(limit)];
            window.iter().position(|&b| b == b'\n').map_or(window.len(), |i| i + 1)
        }
        ReadRequest::Exactly(n) => n.min(input.len()),
    };
    let (head, rest) = input.split_at(take);
    *input = rest;
    Bytes::copy_from_slice(head)
}

/// Drive the decoder over `input`, returning the payload seen and whether it finished.
fn drive(decoder: &mut InboundFrameDecoder, mut input: &[u8]) -> (Vec<u8>, bool) {
    let mut payload = Vec::new();
    while let Some(request) = decoder.next_read() {
        match decoder.on_read(serve(&mut input, request)) {
            Ok(Decoded::Payload(data)) => payload.extend_from_slice(&data),
            Ok(Decoded::Continue) => {}
            Ok(Decoded::Finished) => return (payload, true),
            Err(_) => return (payload, false),
        }
    }
    (payload, decoder.is_done())
}

fn chunked(chunks: &[Vec<u8>], upper_hex: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in chunks.iter().filter(|c| !c.is_empty()) {
        let size = if upper_hex {
            format!("{:X}\r\n", chunk.len())
        } else {
            format!("{:x}\r\n", chunk.len())
        };
        out.extend_from_slice(size.as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

proptest! {
    #[test]
    fn well_formed_bodies_decode_to_their_payload(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 0..12),
        upper_hex in any::<bool>(),
    ) {
        let body = chunked(&chunks, upper_hex);
        let mut decoder = InboundFrameDecoder::new(MAX_LINE, MAX_CHUNK);
        let (payload, finished) = drive(&mut decoder, &body);

        prop_assert!(finished);
        prop_assert_eq!(payload, chunks.concat());
        prop_assert_eq!(decoder.chunks(), chunks.iter().filter(|c| !c.is_empty()).count() as u64);
        prop_assert!(decoder.next_read().is_none());
    }

    #[test]
    fn arbitrary_input_ends_done_or_failed(input in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut decoder = InboundFrameDecoder::new(MAX_LINE, MAX_CHUNK);
        let (payload, finished) = drive(&mut decoder, &input);

        prop_assert_eq!(payload.len() as u64, decoder.payload_bytes());
        if finished {
            prop_assert_eq!(decoder.state(), DecoderState::Done);
        } else {
            prop_assert_eq!(decoder.state(), DecoderState::Failed);
        }
        prop_assert!(decoder.next_read().is_none());
    }
}
