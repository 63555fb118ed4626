use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// Re-encodes a non-UTF-8 source (e.g. `windows-1252` exports) into UTF-8 chunks
/// so the CSV reader only ever sees UTF-8.
pub struct Utf8Transcoder {
    decoder: encoding_rs::Decoder,
}

impl Utf8Transcoder {
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> Option<BytesMut> {
        let bound = if last {
            self.decoder.max_utf8_buffer_length(src.len())
        } else {
            self.decoder
                .max_utf8_buffer_length_without_replacement(src.len())
        };
        let capacity = bound.unwrap_or(src.len() * 3);

        let mut out = vec![0u8; capacity];
        let (_, read, written, _) = self.decoder.decode_to_utf8(src, &mut out, last);
        src.advance(read);

        if written == 0 {
            return None;
        }
        out.truncate(written);
        Some(BytesMut::from(&out[..]))
    }
}

impl Decoder for Utf8Transcoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        // A partial multi-byte sequence stays in `src` until more input arrives.
        Ok(self.transcode(src, false))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if buf.is_empty() {
            return Ok(None);
        }
        let out = self.transcode(buf, true);
        buf.clear();
        Ok(out)
    }
}
