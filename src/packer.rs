//! Greedy packing of command tokens into frames the instrument will accept.

use crate::{command::SEPARATOR, error::ProtocolError};

/// Bytes a token occupies in a frame: itself plus the `;` after it. The last
/// token's separator is the same length as the frame terminator.
pub fn token_cost(token: &str) -> usize {
    token.len() + 1
}

/// Pack `tokens` into `;`-joined frames of at most `max_len` bytes.
///
/// Tokens are never reordered or split. A new frame is only started when the
/// next token does not fit in the current one.
pub fn pack<T: AsRef<str>>(tokens: &[T], max_len: usize) -> Result<Vec<String>, ProtocolError> {
    let mut frames = Vec::new();
    let mut frame: Vec<&str> = Vec::new();
    let mut frame_len = 0;

    for token in tokens {
        let token = token.as_ref();
        let cost = token_cost(token);
        if cost > max_len {
            return Err(ProtocolError::CommandTooLong {
                command: token.into(),
                max_len,
            });
        }

        if frame_len + cost > max_len {
            frames.push(join(&frame));
            frame.clear();
            frame_len = 0;
        }
        frame.push(token);
        frame_len += cost;
    }

    if !frame.is_empty() {
        frames.push(join(&frame));
    }
    Ok(frames)
}

fn join(tokens: &[&str]) -> String {
    tokens.join(SEPARATOR)
}
