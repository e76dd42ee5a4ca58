//! The relay state model of the switch matrix.
//!
//! A [`ConnectionMatrix`] is an immutable value indexed by `(module, output)`.
//! Every "mutation" returns a new matrix, so a matrix handed out by the session
//! can never change underneath the caller.

use std::sync::Arc;

use strum_macros::{Display, EnumIter};

use crate::error::ProtocolError;

/// State of a single relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connection {
    Connected,
    Disconnected,
    /// Only seen before the first status read.
    #[default]
    Unknown,
}

impl Connection {
    pub fn is_known(self) -> bool {
        !matches!(self, Connection::Unknown)
    }

    fn as_char(self) -> char {
        match self {
            Connection::Connected => '1',
            Connection::Disconnected => '0',
            Connection::Unknown => '?',
        }
    }
}

impl From<bool> for Connection {
    fn from(value: bool) -> Self {
        match value {
            true => Connection::Connected,
            false => Connection::Disconnected,
        }
    }
}

/// What to do to a relay. The display form is the command letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum RelayAction {
    #[strum(serialize = "L")]
    Latch,
    #[strum(serialize = "U")]
    Unlatch,
}

impl RelayAction {
    pub fn opposite(self) -> Self {
        match self {
            RelayAction::Latch => RelayAction::Unlatch,
            RelayAction::Unlatch => RelayAction::Latch,
        }
    }

    /// The relay state this action leaves behind.
    pub fn resulting_connection(self) -> Connection {
        match self {
            RelayAction::Latch => Connection::Connected,
            RelayAction::Unlatch => Connection::Disconnected,
        }
    }
}

/// A single intended relay transition, as produced by [`ConnectionMatrix::diff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOperation {
    pub module: usize,
    pub output: usize,
    pub action: RelayAction,
}

/// Grid of relay states, module-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionMatrix {
    modules: usize,
    outputs: usize,
    cells: Arc<[Connection]>,
}

impl ConnectionMatrix {
    /// A matrix whose every relay is [`Connection::Unknown`].
    pub fn unknown(modules: usize, outputs: usize) -> Self {
        Self::filled(modules, outputs, Connection::Unknown)
    }

    /// A matrix with every relay disconnected.
    pub fn disconnected(modules: usize, outputs: usize) -> Self {
        Self::filled(modules, outputs, Connection::Disconnected)
    }

    pub fn filled(modules: usize, outputs: usize, value: Connection) -> Self {
        Self {
            modules,
            outputs,
            cells: vec![value; modules * outputs].into(),
        }
    }

    /// Build a matrix from one row of relay states per module.
    ///
    /// `outputs` is needed so an empty set of modules still has a shape.
    pub fn from_rows<R, C>(outputs: usize, rows: R) -> Result<Self, ProtocolError>
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<Connection>,
    {
        let mut cells = Vec::new();
        let mut modules = 0;
        for (module, row) in rows.into_iter().enumerate() {
            let start = cells.len();
            cells.extend(row.into_iter().map(Into::into));
            let found = cells.len() - start;
            if found != outputs {
                return Err(ProtocolError::RaggedMatrix {
                    module,
                    expected: outputs,
                    found,
                });
            }
            modules += 1;
        }
        Ok(Self {
            modules,
            outputs,
            cells: cells.into(),
        })
    }

    pub fn modules(&self) -> usize {
        self.modules
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.modules, self.outputs)
    }

    /// True once every relay has been read back as connected or disconnected.
    pub fn is_known(&self) -> bool {
        self.cells.iter().all(|c| c.is_known())
    }

    pub fn get(&self, module: usize, output: usize) -> Result<Connection, ProtocolError> {
        let index = self.index(module, output)?;
        Ok(self.cells[index])
    }

    /// Iterate over `(module, output, state)` in module-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, Connection)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, c)| (i / self.outputs, i % self.outputs, *c))
    }

    /// The module-major rows of this matrix.
    pub fn rows(&self) -> impl Iterator<Item = &[Connection]> + '_ {
        (0..self.modules).map(move |m| &self.cells[m * self.outputs..(m + 1) * self.outputs])
    }

    /// Swap the module and output axes.
    pub fn transpose(&self) -> Self {
        let mut cells = Vec::with_capacity(self.cells.len());
        for output in 0..self.outputs {
            for module in 0..self.modules {
                cells.push(self.cells[module * self.outputs + output]);
            }
        }
        Self {
            modules: self.outputs,
            outputs: self.modules,
            cells: cells.into(),
        }
    }

    /// Return a copy of this matrix with one relay replaced.
    pub fn with_connection(
        &self,
        module: usize,
        output: usize,
        value: impl Into<Connection>,
    ) -> Result<Self, ProtocolError> {
        let index = self.index(module, output)?;
        let mut cells = self.cells.to_vec();
        cells[index] = value.into();
        Ok(Self {
            modules: self.modules,
            outputs: self.outputs,
            cells: cells.into(),
        })
    }

    pub fn latch(&self, module: usize, output: usize) -> Result<Self, ProtocolError> {
        self.with_connection(module, output, Connection::Connected)
    }

    pub fn unlatch(&self, module: usize, output: usize) -> Result<Self, ProtocolError> {
        self.with_connection(module, output, Connection::Disconnected)
    }

    /// Return a copy of this matrix with `operation` carried out.
    pub fn apply(&self, operation: &RelayOperation) -> Result<Self, ProtocolError> {
        self.with_connection(
            operation.module,
            operation.output,
            operation.action.resulting_connection(),
        )
    }

    /// The relay operations needed to turn `self` into `target`.
    ///
    /// Operations come out module-major, so all operations on one module are
    /// contiguous. The command serializer depends on that ordering.
    pub fn diff(&self, target: &ConnectionMatrix) -> Result<Vec<RelayOperation>, ProtocolError> {
        if self.dimensions() != target.dimensions() {
            return Err(ProtocolError::DimensionMismatch {
                left: self.dimensions(),
                right: target.dimensions(),
            });
        }

        let operations = self
            .iter()
            .zip(target.cells.iter())
            .filter(|((_, _, current), wanted)| current != *wanted)
            .map(|((module, output, _), wanted)| RelayOperation {
                module,
                output,
                action: match wanted {
                    Connection::Connected => RelayAction::Latch,
                    _ => RelayAction::Unlatch,
                },
            })
            .collect();
        Ok(operations)
    }

    /// First relay which has no known state, if any.
    pub fn first_unknown(&self) -> Option<(usize, usize)> {
        self.iter()
            .find(|(_, _, c)| !c.is_known())
            .map(|(module, output, _)| (module, output))
    }

    fn index(&self, module: usize, output: usize) -> Result<usize, ProtocolError> {
        if module >= self.modules || output >= self.outputs {
            return Err(ProtocolError::IndexOutOfRange {
                module,
                output,
                modules: self.modules,
                outputs: self.outputs,
            });
        }
        Ok(module * self.outputs + output)
    }
}

/// Renders in wire order: one line per output, one character per module.
impl core::fmt::Display for ConnectionMatrix {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for output in 0..self.outputs {
            if output > 0 {
                writeln!(f)?;
            }
            for module in 0..self.modules {
                write!(f, "{}", self.cells[module * self.outputs + output].as_char())?;
            }
        }
        Ok(())
    }
}
