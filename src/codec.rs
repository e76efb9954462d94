use bytes::{Buf, BufMut, BytesMut};
use std::env;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::frame::{Error, Frame, Request, Response};

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Cuts requests out of the receive buffer. Every occurrence of the first `}` ends a request, so
/// request arguments must not contain nested objects or a literal `}`.
pub struct RequestCodec {
    max_frame_size: usize,
    // Bytes before this index are known not to contain a `}`.
    next_index: usize,
}

impl RequestCodec {
    pub fn new(max_frame_size: usize) -> RequestCodec {
        RequestCodec {
            max_frame_size,
            next_index: 0,
        }
    }

    pub fn max_frame_size() -> usize {
        env::var("MAX_FRAME_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Default for RequestCodec {
    fn default() -> Self {
        RequestCodec::new(RequestCodec::max_frame_size())
    }
}

impl Decoder for RequestCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'}') else {
            // Check if the frame size exceeds a certain limit to prevent DoS attacks.
            if src.len() > self.max_frame_size {
                return Err(Error::TooLarge {
                    size: src.len(),
                    limit: self.max_frame_size,
                });
            }
            self.next_index = src.len();
            return Ok(None);
        };

        let end = self.next_index + offset;
        self.next_index = 0;

        // Remove the request, including its closing brace, from the buffer.
        let frame = src.split_to(end + 1);

        match serde_json::from_slice::<Request>(&frame) {
            Ok(request) => Ok(Some(Frame::Request(request))),
            Err(err) => Ok(Some(Frame::Malformed(err))),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // An unterminated request at the end of the stream is dropped.
                src.clear();
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<Request> for RequestCodec {
    type Error = Error;

    fn encode(&mut self, request: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        serde_json::to_writer(dst.writer(), &request)?;
        Ok(())
    }
}

/// Newline delimited JSON responses.
#[derive(Default)]
pub struct ResponseCodec {
    next_index: usize,
}

impl Decoder for ResponseCodec {
    type Item = Response;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            let line = src.split_to(end + 1);
            let line = &line[..line.len() - 1];

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<Response>(line) {
                Ok(response) => return Ok(Some(response)),
                Err(err) => warn!("skipping unparseable response: {}", err),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(response) => Ok(Some(response)),
            None => {
                src.advance(src.len());
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<Response> for ResponseCodec {
    type Error = Error;

    fn encode(&mut self, response: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        serde_json::to_writer(dst.writer(), &response)?;
        dst.put_u8(b'\n');
        Ok(())
    }
}
