//! Splitting and unescaping of the newline-framed retrieval stream.
//!
//! `getData.raw` bodies are a concatenation of frames, each an escaped
//! protobuf message terminated by `\n`. Since the payload is binary, the
//! bytes that would collide with the terminator are escaped in-band:
//!
//! | on the wire | in the frame |
//! |-------------|--------------|
//! | `0x1B 0x01` | `0x1B`       |
//! | `0x1B 0x02` | `0x0A`       |
//! | `0x1B 0x03` | `0x0D`       |
//!
//! [`split`] undoes both layers in one pass so no intermediate unescaped
//! buffer is ever allocated.

const ESC: u8 = 0x1b;
const NL: u8 = 0x0a;
const CR: u8 = 0x0d;

/// Violations of the escape format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// `0x1B` must be followed by `0x01`, `0x02` or `0x03`. The frame
    /// terminator counts: a bare `0x1B` directly before `\n` is malformed.
    #[error("escape byte 0x1b followed by invalid byte {0:#04x}")]
    BadEscape(u8),

    /// The stream ended while bytes of an unterminated frame were pending.
    #[error("stream ended mid-frame with {0} byte(s) pending")]
    UnterminatedFrame(usize),
}

/// Split `input` at unescaped `\n` bytes into logical frames, reversing the
/// escape substitutions within each frame.
///
/// Bytes after the last terminator (including a trailing lone `0x1B`, which
/// may still be completed by the next chunk) are returned raw as the
/// remainder; the caller prepends them to the next chunk.
pub fn split(input: &[u8]) -> Result<(Vec<Vec<u8>>, &[u8]), FramingError> {
    let mut frames = Vec::new();
    let mut cur = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            NL => {
                frames.push(std::mem::take(&mut cur));
                i += 1;
                start = i;
            }
            ESC => {
                let Some(&follow) = input.get(i + 1) else {
                    break; // incomplete escape, leave for the next chunk
                };
                cur.push(match follow {
                    0x01 => ESC,
                    0x02 => NL,
                    0x03 => CR,
                    other => return Err(FramingError::BadEscape(other)),
                });
                i += 2;
            }
            b => {
                cur.push(b);
                i += 1;
            }
        }
    }
    Ok((frames, &input[start..]))
}

/// Escape and terminate each frame, producing the wire form. Inverse of
/// [`split`]; production code never writes the stream, but tests and
/// fixtures do.
pub fn join<F: AsRef<[u8]>>(frames: &[F]) -> Vec<u8> {
    let mut out = Vec::new();
    for frame in frames {
        for &b in frame.as_ref() {
            match b {
                ESC => out.extend_from_slice(&[ESC, 0x01]),
                NL => out.extend_from_slice(&[ESC, 0x02]),
                CR => out.extend_from_slice(&[ESC, 0x03]),
                b => out.push(b),
            }
        }
        out.push(NL);
    }
    out
}
