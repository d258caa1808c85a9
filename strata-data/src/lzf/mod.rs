//! LZF compression as used by `binary_compressed` point files.
//!
//! - [`LzfDecoder`] decodes incrementally from arbitrarily sized chunks.
//! - [`compress`] produces streams the decoder (and liblzf) accepts.
//! - [`SoaAssembler`] turns decoded structure-of-arrays bytes into
//!   interleaved point batches.

mod assembler;
mod decoder;
mod encoder;

pub use assembler::SoaAssembler;
pub use decoder::{LzfDecoder, WINDOW};
pub use encoder::compress;

use crate::error::LzfError;

/// Decode a complete stream into memory.
///
/// With `expected_len` set, output beyond that size is rejected.
pub fn decompress(input: &[u8], expected_len: Option<u64>) -> Result<Vec<u8>, LzfError> {
    let mut decoder = match expected_len {
        Some(len) => LzfDecoder::with_expected_len(len),
        None => LzfDecoder::new(),
    };
    let mut out = Vec::with_capacity(expected_len.unwrap_or(input.len() as u64 * 2) as usize);
    decoder.consume(input, |_, bytes| out.extend_from_slice(bytes))?;
    decoder.finish()?;
    Ok(out)
}
