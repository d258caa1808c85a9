//! Resumable LZF decoder.

use crate::error::LzfError;

/// Largest back-reference distance the format can express.
pub const WINDOW: usize = 8192;

/// History kept before the oldest bytes are released.
const RETAIN: usize = 4 * WINDOW;

/// Incremental liblzf-compatible decoder.
///
/// Input may arrive in chunks of any size. Decoded bytes are reported as
/// `(absolute_offset, bytes)` events; only the last [`WINDOW`] bytes of output
/// are retained for back-references, so memory stays bounded no matter how
/// large the uncompressed payload is.
#[derive(Debug)]
pub struct LzfDecoder {
    /// Tail of the output; `history[0]` sits at absolute offset `base`.
    history: Vec<u8>,
    base: u64,
    /// Output up to this absolute offset has been reported.
    emitted: u64,
    /// Bytes still owed to a literal run that crossed a chunk boundary.
    literal_remaining: usize,
    /// Partially received back-reference token (control byte first).
    pending: [u8; 3],
    pending_len: usize,
    expected: Option<u64>,
    failed: Option<LzfError>,
}

impl LzfDecoder {
    pub fn new() -> Self {
        Self {
            history: Vec::with_capacity(RETAIN + 264),
            base: 0,
            emitted: 0,
            literal_remaining: 0,
            pending: [0; 3],
            pending_len: 0,
            expected: None,
            failed: None,
        }
    }

    /// Decoder that rejects output beyond `len` bytes.
    pub fn with_expected_len(len: u64) -> Self {
        Self {
            expected: Some(len),
            ..Self::new()
        }
    }

    /// Total bytes decoded so far.
    pub fn produced(&self) -> u64 {
        self.base + self.history.len() as u64
    }

    /// Decode `input`, reporting newly produced bytes through `on_output`.
    ///
    /// A token split across calls is held back and completed by the next
    /// call. After an error the decoder stays failed.
    pub fn consume<F>(&mut self, input: &[u8], mut on_output: F) -> Result<(), LzfError>
    where
        F: FnMut(u64, &[u8]),
    {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        let result = self.decode(input, &mut on_output);
        // Report whatever was decoded before a failure as well.
        self.flush(&mut on_output);
        if let Err(err) = &result {
            self.failed = Some(err.clone());
        }
        result
    }

    /// Check that the stream did not end inside a token.
    ///
    /// Returns the total number of decoded bytes.
    pub fn finish(&self) -> Result<u64, LzfError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.literal_remaining > 0 || self.pending_len > 0 {
            return Err(LzfError::Truncated);
        }
        Ok(self.produced())
    }

    fn decode<F>(&mut self, input: &[u8], on_output: &mut F) -> Result<(), LzfError>
    where
        F: FnMut(u64, &[u8]),
    {
        let mut pos = 0;
        while pos < input.len() {
            if self.literal_remaining > 0 {
                let n = self.literal_remaining.min(input.len() - pos);
                self.reserve(n)?;
                self.history.extend_from_slice(&input[pos..pos + n]);
                pos += n;
                self.literal_remaining -= n;
                self.release(on_output);
                continue;
            }

            let ctrl = if self.pending_len > 0 {
                self.pending[0]
            } else {
                input[pos]
            };
            if ctrl < 32 {
                self.literal_remaining = ctrl as usize + 1;
                pos += 1;
                continue;
            }

            let needed = if ctrl >> 5 == 7 { 3 } else { 2 };
            while self.pending_len < needed && pos < input.len() {
                self.pending[self.pending_len] = input[pos];
                self.pending_len += 1;
                pos += 1;
            }
            if self.pending_len < needed {
                break;
            }
            self.pending_len = 0;

            let mut len = (ctrl >> 5) as usize;
            let mut offset_byte = self.pending[1];
            if len == 7 {
                len += self.pending[1] as usize;
                offset_byte = self.pending[2];
            }
            len += 2;
            let distance = (((ctrl & 0x1f) as usize) << 8) + offset_byte as usize + 1;
            self.copy_back(distance, len)?;
            self.release(on_output);
        }
        Ok(())
    }

    fn copy_back(&mut self, distance: usize, len: usize) -> Result<(), LzfError> {
        if distance as u64 > self.produced() {
            return Err(LzfError::BackReferenceOutOfRange {
                position: self.produced(),
                distance,
            });
        }
        self.reserve(len)?;
        // Source and destination may overlap; copy forward one byte at a time.
        let mut src = self.history.len() - distance;
        for _ in 0..len {
            let byte = self.history[src];
            self.history.push(byte);
            src += 1;
        }
        Ok(())
    }

    fn reserve(&self, additional: usize) -> Result<(), LzfError> {
        match self.expected {
            Some(expected) if self.produced() + additional as u64 > expected => {
                Err(LzfError::OutputOverflow { expected })
            }
            _ => Ok(()),
        }
    }

    fn flush<F: FnMut(u64, &[u8])>(&mut self, on_output: &mut F) {
        let start = (self.emitted - self.base) as usize;
        if start < self.history.len() {
            on_output(self.emitted, &self.history[start..]);
            self.emitted = self.produced();
        }
    }

    /// Report pending output and drop history older than the window.
    fn release<F: FnMut(u64, &[u8])>(&mut self, on_output: &mut F) {
        if self.history.len() <= RETAIN {
            return;
        }
        self.flush(on_output);
        let drop = self.history.len() - WINDOW;
        self.history.drain(..drop);
        self.base += drop as u64;
    }
}

impl Default for LzfDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8], chunk: usize) -> Result<Vec<u8>, LzfError> {
        let mut decoder = LzfDecoder::new();
        let mut out = Vec::new();
        for piece in input.chunks(chunk.max(1)) {
            decoder.consume(piece, |offset, bytes| {
                assert_eq!(offset as usize, out.len());
                out.extend_from_slice(bytes);
            })?;
        }
        decoder.finish()?;
        Ok(out)
    }

    #[test]
    fn test_literal_run() {
        let out = decode_all(&[0x02, b'a', b'b', b'c'], 64).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_overlapping_back_reference() {
        // "ab", then copy 3 bytes from 2 back: a b a
        let stream = [0x01, b'a', b'b', 0x20, 0x01];
        for chunk in 1..=stream.len() {
            assert_eq!(decode_all(&stream, chunk).unwrap(), b"ababa");
        }
    }

    #[test]
    fn test_extended_length_back_reference() {
        // 'x', then a 7+5+2 = 14 byte run at distance 1
        let stream = [0x00, b'x', 0xE0, 0x05, 0x00];
        for chunk in 1..=stream.len() {
            assert_eq!(decode_all(&stream, chunk).unwrap(), vec![b'x'; 15]);
        }
    }

    #[test]
    fn test_back_reference_before_start_fails() {
        let err = decode_all(&[0x20, 0x00], 8).unwrap_err();
        assert_eq!(
            err,
            LzfError::BackReferenceOutOfRange {
                position: 0,
                distance: 1
            }
        );
    }

    #[test]
    fn test_failure_is_sticky() {
        let mut decoder = LzfDecoder::new();
        assert!(decoder.consume(&[0x20, 0x00], |_, _| {}).is_err());
        assert!(decoder.consume(&[0x00, b'a'], |_, _| {}).is_err());
        assert!(decoder.finish().is_err());
    }

    #[test]
    fn test_truncated_token() {
        let mut decoder = LzfDecoder::new();
        decoder.consume(&[0x00, b'a', 0xE0], |_, _| {}).unwrap();
        assert_eq!(decoder.finish(), Err(LzfError::Truncated));

        let mut decoder = LzfDecoder::new();
        decoder.consume(&[0x04, b'a'], |_, _| {}).unwrap();
        assert_eq!(decoder.finish(), Err(LzfError::Truncated));
    }

    #[test]
    fn test_expected_length_overflow() {
        let mut decoder = LzfDecoder::with_expected_len(2);
        let err = decoder.consume(&[0x02, b'a', b'b', b'c'], |_, _| {}).unwrap_err();
        assert_eq!(err, LzfError::OutputOverflow { expected: 2 });
    }

    #[test]
    fn test_history_stays_bounded() {
        // 32 literal bytes followed by many maximal-length back-references.
        let mut stream = vec![31u8];
        stream.extend((0..32).map(|i| i as u8));
        for _ in 0..2000 {
            stream.extend_from_slice(&[0xE0, 0xFF, 0x1F]);
        }
        let mut decoder = LzfDecoder::new();
        let mut total = 0usize;
        decoder
            .consume(&stream, |offset, bytes| {
                assert_eq!(offset as usize, total);
                total += bytes.len();
            })
            .unwrap();
        assert_eq!(total, 32 + 2000 * 264);
        assert!(decoder.history.len() <= RETAIN + 264);
    }
}
