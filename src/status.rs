//! Encoding and decoding of the full status dump (`S`).
//!
//! The instrument answers with one line per output. Each line holds one byte
//! per module, `'1'` for latched and `'0'` for unlatched, followed by `\r`:
//!
//! ```text
//! module: 01234567
//!         10000000\r   <- output 0
//!         00100000\r   <- output 1
//! ```
//!
//! Lines are per output, so the decoded grid is transposed into the
//! module-major [`ConnectionMatrix`].

use crate::{
    command::{Command, TERMINATOR},
    error::ProtocolError,
    matrix::{Connection, ConnectionMatrix},
};

/// The command requesting a full status dump.
pub fn status_query() -> Command {
    Command::Status
}

/// Exact number of bytes in a status response, terminators included.
pub fn response_len(modules: usize, outputs: usize) -> usize {
    (modules + 1) * outputs
}

/// Decode a status response into a module-major matrix.
pub fn decode(raw: &[u8], modules: usize, outputs: usize) -> Result<ConnectionMatrix, ProtocolError> {
    let expected = response_len(modules, outputs);
    if raw.len() != expected {
        return Err(ProtocolError::TruncatedStatusResponse {
            expected,
            actual: raw.len(),
        });
    }
    if outputs == 0 {
        return Ok(ConnectionMatrix::disconnected(modules, 0));
    }

    let mut lines: Vec<&[u8]> = raw.split(|&b| b == TERMINATOR).collect();
    // The final terminator leaves an empty segment behind.
    match lines.pop() {
        Some([]) => {}
        _ => {
            return Err(ProtocolError::MalformedStatusResponse(
                "response does not end with a terminator".into(),
            ));
        }
    }
    if lines.len() != outputs {
        return Err(ProtocolError::MalformedStatusResponse(format!(
            "expected {outputs} lines, got {}",
            lines.len()
        )));
    }

    let mut rows = Vec::with_capacity(outputs);
    for (output, line) in lines.into_iter().enumerate() {
        if line.len() != modules {
            return Err(ProtocolError::MalformedStatusResponse(format!(
                "line {output} has {} status bytes, expected {modules}",
                line.len()
            )));
        }
        let row = line
            .iter()
            .map(|&b| match b {
                b'0' => Ok(Connection::Disconnected),
                b'1' => Ok(Connection::Connected),
                other => Err(ProtocolError::MalformedStatusResponse(format!(
                    "unexpected status byte 0x{other:02X} on line {output}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    Ok(ConnectionMatrix::from_rows(modules, rows)?.transpose())
}

/// Render a fully known matrix as the instrument would report it.
pub fn encode(matrix: &ConnectionMatrix) -> Result<Vec<u8>, ProtocolError> {
    if let Some((module, output)) = matrix.first_unknown() {
        return Err(ProtocolError::MalformedStatusResponse(format!(
            "relay ({module}, {output}) has no known state to encode"
        )));
    }

    let mut raw = Vec::with_capacity(response_len(matrix.modules(), matrix.outputs()));
    for line in matrix.transpose().rows() {
        raw.extend(line.iter().map(|c| match c {
            Connection::Connected => b'1',
            _ => b'0',
        }));
        raw.push(TERMINATOR);
    }
    Ok(raw)
}
