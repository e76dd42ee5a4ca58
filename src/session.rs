use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::{
    command::{self, Command, CONFIGURE_ACK, PROBE_ACK},
    config::{InstrumentConfig, ReplyModes},
    error::{Error, InitFailure, Phase, ProtocolError, Result},
    matrix::ConnectionMatrix,
    packer, status,
    transport::{self, LinkError},
};

/// What the session currently believes about the instrument.
///
/// Replaced wholesale by each operation, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    matrix: ConnectionMatrix,
    reply_modes: ReplyModes,
    stale: bool,
}

impl SessionState {
    fn new(matrix: ConnectionMatrix, reply_modes: ReplyModes) -> Self {
        Self {
            matrix,
            reply_modes,
            stale: true,
        }
    }

    /// Relay states as last read, or as last commanded when [`Self::is_stale`].
    pub fn matrix(&self) -> &ConnectionMatrix {
        &self.matrix
    }

    /// Reply modes in effect on the instrument.
    pub fn reply_modes(&self) -> ReplyModes {
        self.reply_modes
    }

    /// True when the matrix may no longer match the relays.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    fn observed(&self, matrix: ConnectionMatrix) -> Self {
        Self {
            matrix,
            stale: false,
            ..self.clone()
        }
    }

    fn assumed(&self, matrix: ConnectionMatrix) -> Self {
        Self {
            matrix,
            stale: true,
            ..self.clone()
        }
    }

    fn stale(&self) -> Self {
        Self {
            stale: true,
            ..self.clone()
        }
    }

    fn with_reply_modes(&self, reply_modes: ReplyModes) -> Self {
        Self {
            reply_modes,
            ..self.clone()
        }
    }
}

/// Switch commands which have been sent but not yet checked.
///
/// Returned by [`InstrumentSession::transmit`] and consumed by
/// [`InstrumentSession::verify`].
#[derive(Debug, Clone)]
#[must_use]
pub struct PendingSwitch {
    target: ConnectionMatrix,
    operations: usize,
    frames: usize,
    settled_at: Instant,
}

impl PendingSwitch {
    pub fn target(&self) -> &ConnectionMatrix {
        &self.target
    }

    /// Number of relays commanded to change.
    pub fn operations(&self) -> usize {
        self.operations
    }

    pub fn frames_sent(&self) -> usize {
        self.frames
    }

    /// Earliest instant a status read reflects the switch.
    pub fn settled_at(&self) -> Instant {
        self.settled_at
    }

    /// Time left until [`Self::settled_at`].
    pub fn remaining(&self) -> Duration {
        self.settled_at.saturating_duration_since(Instant::now())
    }

    pub fn into_target(self) -> ConnectionMatrix {
        self.target
    }
}

/// A session with a Cytec switch matrix over any interface which implements
/// [embedded_io::Read] & [embedded_io::Write].
///
/// The session owns the interface, so only one command exchange can ever be
/// in flight. `L` is the size of the buffer used for line replies.
pub struct InstrumentSession<S: embedded_io::Read + embedded_io::Write, const L: usize = 64> {
    interface: S,
    config: InstrumentConfig,
    state: SessionState,
}

impl<S: embedded_io::Read + embedded_io::Write, const L: usize> InstrumentSession<S, L> {
    /// Handshake with the instrument, write the system configuration and read
    /// the relay states.
    pub fn connect(interface: S, config: InstrumentConfig) -> Result<Self, S::Error> {
        let mut session = Self::attach(interface, config);
        info!(
            modules = config.modules(),
            outputs = config.outputs(),
            "Initializing switch matrix"
        );
        session.handshake()?;
        session.configure()?;
        session.refresh()?;
        info!("Switch matrix ready");
        Ok(session)
    }

    /// Wrap an instrument which is already configured, skipping the handshake.
    ///
    /// The reply modes are taken from `config` and the relay states are
    /// unknown until the first [`Self::refresh`].
    pub fn attach(interface: S, config: InstrumentConfig) -> Self {
        Self {
            interface,
            config,
            state: SessionState::new(
                ConnectionMatrix::unknown(config.modules(), config.outputs()),
                config.reply_modes(),
            ),
        }
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Last known relay states. See [`SessionState::matrix`].
    pub fn matrix(&self) -> &ConnectionMatrix {
        self.state.matrix()
    }

    pub fn is_stale(&self) -> bool {
        self.state.is_stale()
    }

    /// Stop trusting the stored matrix, e.g. after an interrupted operation.
    pub fn mark_stale(&mut self) {
        self.state = self.state.stale();
    }

    /// Give back the interface.
    pub fn release(self) -> S {
        self.interface
    }

    /// Turn all reply modes off. Skipped if they are already off, unless `force` is set.
    pub fn silence(&mut self, force: bool) -> Result<(), S::Error> {
        if force || !self.state.reply_modes().is_silent() {
            let command = Command::Silence.to_string();
            transport::write_line(&mut self.interface, &command)
                .map_err(|e| serial_error(Phase::Silence, &command, e))?;
            debug!("Silenced instrument replies");
        }
        self.state = self.state.with_reply_modes(ReplyModes::silent());
        Ok(())
    }

    /// Read every relay state from the instrument and store it.
    pub fn refresh(&mut self) -> Result<ConnectionMatrix, S::Error> {
        match self.read_status() {
            Ok(matrix) => {
                self.state = self.state.observed(matrix.clone());
                Ok(matrix)
            }
            Err(e) => {
                self.state = self.state.stale();
                Err(e)
            }
        }
    }

    /// Move the relays to `target`.
    ///
    /// With `verify`, waits for the relays to settle, reads them back and fails
    /// with [`Error::SwitchVerificationFailed`] if they are not in the target
    /// state. Without it, `target` is returned unchecked and the session is
    /// left stale.
    pub fn switch(&mut self, target: &ConnectionMatrix, verify: bool) -> Result<ConnectionMatrix, S::Error> {
        let pending = self.transmit(target)?;
        if verify {
            return self.verify(pending);
        }
        if pending.frames_sent() > 0 {
            self.state = self.state.assumed(pending.target().clone());
        }
        Ok(pending.into_target())
    }

    /// First half of [`Self::switch`]: read the current state and send the
    /// commands needed to reach `target`.
    pub fn transmit(&mut self, target: &ConnectionMatrix) -> Result<PendingSwitch, S::Error> {
        let dimensions = (self.config.modules(), self.config.outputs());
        if target.dimensions() != dimensions {
            return Err(ProtocolError::DimensionMismatch {
                left: dimensions,
                right: target.dimensions(),
            }
            .into());
        }
        if let Some((module, output)) = target.first_unknown() {
            return Err(ProtocolError::UnknownTargetCell { module, output }.into());
        }

        // Always diff against a fresh read, never against what we last commanded.
        let current = self.refresh()?;
        let max_len = self.config.max_frame_len();
        let operations = current.diff(target)?;
        let tokens = command::relay_tokens(&operations, max_len);
        let frames = packer::pack(&tokens, max_len)?;

        self.silence(false)?;
        if !frames.is_empty() {
            self.state = self.state.stale();
        }

        let mut last_sent = Instant::now();
        for frame in &frames {
            debug!(%frame, "Sending switch frame");
            transport::write_line(&mut self.interface, frame)
                .map_err(|e| serial_error(Phase::Switch, frame, e))?;
            last_sent = Instant::now();
        }

        let settled_at = if frames.is_empty() {
            last_sent
        } else {
            last_sent + self.config.settling_duration()
        };
        info!(
            operations = operations.len(),
            frames = frames.len(),
            "Switch commands sent"
        );

        Ok(PendingSwitch {
            target: target.clone(),
            operations: operations.len(),
            frames: frames.len(),
            settled_at,
        })
    }

    /// Second half of [`Self::switch`]: wait out the settling delay, read the
    /// relays back and compare them with the target.
    pub fn verify(&mut self, pending: PendingSwitch) -> Result<ConnectionMatrix, S::Error> {
        let remaining = pending.remaining();
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }

        let observed = self.refresh()?;
        if observed != pending.target {
            warn!(
                expected = %pending.target,
                observed = %observed,
                "Relays did not reach the requested state"
            );
            return Err(Error::SwitchVerificationFailed {
                expected: pending.target,
                observed,
            });
        }
        Ok(observed)
    }

    /// Ask for the current reply modes to be silenced with answerback left on,
    /// and expect the instrument to acknowledge.
    ///
    /// A framing error on the first attempt is usually noise from the port
    /// opening, so that one case gets a single retry.
    fn handshake(&mut self) -> Result<(), S::Error> {
        let probe = Command::Probe.to_string();
        let reply = match self.query_line(&probe) {
            Err(e) if e.is_framing() => {
                warn!(command = %probe, "Framing error during handshake, retrying once");
                self.query_line(&probe)
            }
            reply => reply,
        }
        .map_err(|e| init_error(Phase::Handshake, &probe, e))?;

        if reply.as_slice() != PROBE_ACK.as_bytes() {
            return Err(Error::InitializationFailed {
                phase: Phase::Handshake,
                command: probe,
                reason: InitFailure::UnexpectedReply(String::from_utf8_lossy(&reply).into_owned()),
            });
        }

        self.state = self
            .state
            .with_reply_modes(ReplyModes::silent().with_answerback(true));
        debug!("Handshake acknowledged");
        Ok(())
    }

    /// Tell the instrument about the chassis, module and output counts.
    fn configure(&mut self) -> Result<(), S::Error> {
        let command = Command::Configure {
            modules: self.config.modules(),
            outputs: self.config.outputs(),
        }
        .to_string();

        transport::write_line(&mut self.interface, &command)
            .map_err(|e| init_error(Phase::Configure, &command, e))?;
        let ack = transport::read_exact_len(&mut self.interface, CONFIGURE_ACK.len())
            .map_err(|e| init_error(Phase::Configure, &command, e))?;

        if ack != CONFIGURE_ACK {
            return Err(Error::InitializationFailed {
                phase: Phase::Configure,
                command,
                reason: InitFailure::UnexpectedReply(String::from_utf8_lossy(&ack).into_owned()),
            });
        }
        debug!(%command, "System configuration accepted");
        Ok(())
    }

    fn read_status(&mut self) -> Result<ConnectionMatrix, S::Error> {
        self.silence(false)?;

        let command = status::status_query().to_string();
        let (modules, outputs) = (self.config.modules(), self.config.outputs());
        transport::write_line(&mut self.interface, &command)
            .map_err(|e| serial_error(Phase::Query, &command, e))?;
        let raw = transport::read_exact_len(&mut self.interface, status::response_len(modules, outputs))
            .map_err(|e| serial_error(Phase::Query, &command, e))?;

        let matrix = status::decode(&raw, modules, outputs)?;
        debug!(bytes = raw.len(), "Read relay status");
        Ok(matrix)
    }

    fn query_line(&mut self, command: &str) -> core::result::Result<heapless::Vec<u8, L>, LinkError<S::Error>> {
        transport::write_line(&mut self.interface, command)?;
        transport::read_line::<S, L>(&mut self.interface)
    }
}

fn serial_error<I: embedded_io::Error>(phase: Phase, command: &str, err: LinkError<I>) -> Error<I> {
    match err {
        LinkError::Io(cause) => Error::Serial {
            phase,
            command: command.into(),
            cause,
        },
        LinkError::Overflow => Error::BufferOverflow,
    }
}

fn init_error<I: embedded_io::Error>(phase: Phase, command: &str, err: LinkError<I>) -> Error<I> {
    let reason = match err {
        LinkError::Io(cause) => InitFailure::Serial(cause),
        LinkError::Overflow => InitFailure::BufferOverflow,
    };
    Error::InitializationFailed {
        phase,
        command: command.into(),
        reason,
    }
}
