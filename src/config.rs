//! Instrument configuration and the reply mode flags.

use fugit::MillisDurationU32;
use modular_bitfield::prelude::*;

/// Longest frame the instrument's input buffer accepts, terminator included.
pub const MAX_COMMAND_LENGTH: usize = 60;

/// Minimum wait after the last switch frame before a status read can be trusted.
pub const SETTLING_DELAY: MillisDurationU32 = MillisDurationU32::millis(20);

/// Reply behaviour of the instrument.
///
/// Any of these being on makes the instrument send extra text back, which
/// would corrupt fixed-length status reads, so the session turns them off
/// before querying.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyModes {
    /// `A1`: acknowledge every command with `0`/`1`.
    pub answerback: bool,
    /// `E1`: echo received characters.
    pub echo: bool,
    /// `V1`: verbose text replies.
    pub verbose: bool,
    #[skip]
    __: B5,
}

impl ReplyModes {
    /// All reply modes off.
    pub fn silent() -> Self {
        Self::new()
    }

    pub fn is_silent(&self) -> bool {
        !(self.answerback() || self.echo() || self.verbose())
    }
}

/// Power-on state of the instrument: answerback on, echo and verbose off.
impl Default for ReplyModes {
    fn default() -> Self {
        Self::new().with_answerback(true)
    }
}

/// Configuration captured when a session starts. It does not change for the
/// lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentConfig {
    modules: usize,
    outputs: usize,
    reply_modes: ReplyModes,
    max_frame_len: usize,
    settling_delay: MillisDurationU32,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            modules: 8,
            outputs: 16,
            reply_modes: ReplyModes::default(),
            max_frame_len: MAX_COMMAND_LENGTH,
            settling_delay: SETTLING_DELAY,
        }
    }
}

impl InstrumentConfig {
    pub fn new(modules: usize, outputs: usize) -> Self {
        Self {
            modules,
            outputs,
            ..Default::default()
        }
    }

    /// Number of switching modules in the chassis.
    pub fn modules(&self) -> usize {
        self.modules
    }

    /// Number of outputs on the motherboard.
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Reply modes the instrument is assumed to be in before we talk to it.
    pub fn reply_modes(&self) -> ReplyModes {
        self.reply_modes
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    pub fn settling_delay(&self) -> MillisDurationU32 {
        self.settling_delay
    }

    /// The settling delay as a [`std::time::Duration`] for sleeping on.
    pub fn settling_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(u64::from(self.settling_delay.to_millis()))
    }

    pub fn with_modules(mut self, modules: usize) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_outputs(mut self, outputs: usize) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_reply_modes(mut self, reply_modes: ReplyModes) -> Self {
        self.reply_modes = reply_modes;
        self
    }

    /// Set the longest frame we will send. Includes the terminator.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn with_settling_delay(mut self, settling_delay: MillisDurationU32) -> Self {
        self.settling_delay = settling_delay;
        self
    }
}
