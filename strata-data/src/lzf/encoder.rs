//! Greedy LZF encoder producing liblzf-compatible streams.

const HASH_LOG: u32 = 14;
const MAX_LITERAL: usize = 32;
const MAX_DISTANCE: usize = 8192;
const MAX_MATCH: usize = 264;
const MIN_MATCH: usize = 3;

fn hash(bytes: &[u8]) -> usize {
    let v = (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32;
    (v.wrapping_mul(2_654_435_761) >> (32 - HASH_LOG)) as usize
}

fn push_literals(out: &mut Vec<u8>, literals: &[u8]) {
    for run in literals.chunks(MAX_LITERAL) {
        out.push((run.len() - 1) as u8);
        out.extend_from_slice(run);
    }
}

/// Compress `input` into an LZF stream.
///
/// Uses a single-entry hash table keyed on the next three bytes; matches
/// may overlap the bytes being encoded.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() / 2 + 16);
    // Position + 1 of the last occurrence of each hash; 0 means empty.
    let mut table = vec![0usize; 1 << HASH_LOG];
    let mut literal_start = 0;
    let mut pos = 0;

    while pos + MIN_MATCH <= input.len() {
        let slot = hash(&input[pos..]);
        let candidate = table[slot];
        table[slot] = pos + 1;

        if candidate > 0 {
            let reference = candidate - 1;
            let offset = pos - reference - 1;
            if offset < MAX_DISTANCE && input[reference..reference + MIN_MATCH] == input[pos..pos + MIN_MATCH] {
                let limit = MAX_MATCH.min(input.len() - pos);
                let mut len = MIN_MATCH;
                while len < limit && input[reference + len] == input[pos + len] {
                    len += 1;
                }

                push_literals(&mut out, &input[literal_start..pos]);
                let encoded = len - 2;
                if encoded < 7 {
                    out.push(((encoded as u8) << 5) | (offset >> 8) as u8);
                } else {
                    out.push((7 << 5) | (offset >> 8) as u8);
                    out.push((encoded - 7) as u8);
                }
                out.push(offset as u8);

                pos += len;
                literal_start = pos;
                continue;
            }
        }
        pos += 1;
    }

    push_literals(&mut out, &input[literal_start..]);
    out
}
