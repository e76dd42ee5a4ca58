//! The instrument's command vocabulary.
//!
//! Commands are ASCII, terminated by a carriage return and may be batched
//! with `;`. Configuration commands carry the instrument's key, `73`.

use crate::{matrix::RelayOperation, packer::token_cost};

/// Carriage return, used as both write and read terminator.
pub const TERMINATOR: u8 = b'\r';

/// Separator between batched commands.
pub const SEPARATOR: &str = ";";

/// What the instrument sends back for each accepted configuration command.
pub const CONFIGURE_ACK: &[u8] = b"0\r0\r0\r";

/// Reply to the handshake probe when all is well.
pub const PROBE_ACK: &str = "0";

/// Non-relay commands the session sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Turn answerback, echo and verbose off.
    Silence,
    /// Turn echo and verbose off but leave answerback on so the instrument
    /// acknowledges with `0`.
    Probe,
    /// VX style chassis, with the number of switching modules and outputs.
    Configure { modules: usize, outputs: usize },
    /// Dump the state of every relay.
    Status,
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Command::Silence => f.write_str("A0 73;E0 73;V0 73"),
            Command::Probe => f.write_str("A0 73;E0 73;V0 73;A1 73"),
            Command::Configure { modules, outputs } => {
                write!(f, "P2 1 73;P10 {modules} 73;P20 {outputs} 73")
            }
            Command::Status => f.write_str("S"),
        }
    }
}

/// Serialize relay operations into command tokens.
///
/// The first operation of a module run names the module (`L3 7`), the rest of
/// the run only give the output (`L9`). A short token is only meaningful in
/// the same frame as the token that named its module, so the packer's frame
/// breaks are tracked here: when a short token would not fit in the current
/// `max_len` frame, the long form is emitted instead and starts the next one.
pub fn relay_tokens(operations: &[RelayOperation], max_len: usize) -> Vec<String> {
    let mut tokens = Vec::with_capacity(operations.len());
    let mut run_module = None;
    let mut frame_len = 0;

    for op in operations {
        let short = format!("{}{}", op.action, op.output);
        let continues_run =
            run_module == Some(op.module) && frame_len + token_cost(&short) <= max_len;
        let token = if continues_run {
            short
        } else {
            format!("{}{} {}", op.action, op.module, op.output)
        };

        let cost = token_cost(&token);
        if frame_len + cost > max_len {
            frame_len = 0;
        }
        frame_len += cost;
        run_module = Some(op.module);
        tokens.push(token);
    }

    tokens
}
