//! Line and fixed-length I/O on top of [`embedded_io`].
//!
//! Writes get the `\r` terminator appended. Line reads strip it. Fixed-length
//! reads are used where the instrument's reply size is known up front.

use embedded_io::{Error, ErrorKind};

use crate::command::TERMINATOR;

/// Failures below the command level.
#[derive(Debug)]
pub(crate) enum LinkError<E> {
    Io(E),
    /// The line did not fit in the read buffer.
    Overflow,
}

impl<E: Error> LinkError<E> {
    /// Serial framing errors show up as invalid data.
    pub(crate) fn is_framing(&self) -> bool {
        matches!(self, LinkError::Io(e) if matches!(e.kind(), ErrorKind::InvalidData))
    }
}

/// True for read errors which just mean "nothing more right now".
fn is_quiet(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::Other | ErrorKind::TimedOut)
}

/// Write `command` followed by the terminator.
pub(crate) fn write_line<S: embedded_io::Write>(
    interface: &mut S,
    command: &str,
) -> Result<(), LinkError<S::Error>> {
    interface.write_all(command.as_bytes()).map_err(LinkError::Io)?;
    interface.write_all(&[TERMINATOR]).map_err(LinkError::Io)?;
    interface.flush().map_err(LinkError::Io)
}

/// Read up to the next terminator and return the line without it.
///
/// A quiet read after some data has arrived also ends the line.
pub(crate) fn read_line<S: embedded_io::Read, const L: usize>(
    interface: &mut S,
) -> Result<heapless::Vec<u8, L>, LinkError<S::Error>> {
    let mut line: heapless::Vec<u8, L> = heapless::Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match interface.read(&mut byte) {
            Ok(0) => break,
            Ok(_) if byte[0] == TERMINATOR => break,
            Ok(_) => line.push(byte[0]).map_err(|_| LinkError::Overflow)?,
            Err(e) if is_quiet(e.kind()) && !line.is_empty() => break,
            Err(e) => return Err(LinkError::Io(e)),
        }
    }
    Ok(line)
}

/// Read exactly `len` bytes, unless the instrument goes quiet first.
///
/// A short result is returned as is; the caller decides whether that is an
/// error.
pub(crate) fn read_exact_len<S: embedded_io::Read>(
    interface: &mut S,
    len: usize,
) -> Result<Vec<u8>, LinkError<S::Error>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match interface.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if is_quiet(e.kind()) && filled > 0 => break,
            Err(e) => return Err(LinkError::Io(e)),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}
