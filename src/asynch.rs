//! Async front end for [`InstrumentSession`].
//!
//! Talking to the instrument is blocking, so each exchange runs on tokio's
//! blocking pool while the caller awaits it with a deadline. The session sits
//! behind a mutex, so calls from several tasks still reach the instrument one
//! at a time. A second, async lock is held for the whole of each public call,
//! so a verified switch keeps the instrument through its settling delay.
//!
//! If a deadline passes while an exchange is running, the exchange is left to
//! finish on its own and the session is marked stale. The next operation then
//! re-reads the relays before acting on them.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{task::JoinError, time::Instant};
use tracing::warn;

use crate::{
    config::InstrumentConfig,
    error::{Error, Result},
    matrix::ConnectionMatrix,
    session::InstrumentSession,
};

/// Async wrapper around an [`InstrumentSession`] with per-call timeouts.
pub struct AsyncInstrument<S: embedded_io::Read + embedded_io::Write, const L: usize = 64> {
    session: Arc<Mutex<InstrumentSession<S, L>>>,
    /// Held from start to finish of every public operation.
    operation: tokio::sync::Mutex<()>,
    /// Set when a caller gave up on an exchange that was still running.
    interrupted: Arc<AtomicBool>,
}

impl<S, const L: usize> AsyncInstrument<S, L>
where
    S: embedded_io::Read + embedded_io::Write + Send + 'static,
    S::Error: Send + 'static,
{
    /// Run [`InstrumentSession::connect`] within `timeout`.
    pub async fn connect(interface: S, config: InstrumentConfig, timeout: Duration) -> Result<Self, S::Error> {
        let task =
            tokio::task::spawn_blocking(move || InstrumentSession::<S, L>::connect(interface, config));
        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => Ok(Self::new(join_result(joined)?)),
            Err(_) => {
                warn!("Timed out initializing switch matrix");
                Err(Error::Timeout)
            }
        }
    }

    pub fn new(session: InstrumentSession<S, L>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            operation: tokio::sync::Mutex::new(()),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Read every relay state, giving up after `timeout`.
    pub async fn refresh(&self, timeout: Duration) -> Result<ConnectionMatrix, S::Error> {
        let deadline = Instant::now() + timeout;
        let _operation = self.begin(deadline).await?;
        self.run_until(deadline, |session| session.refresh()).await
    }

    /// Move the relays to `target`, giving up after `timeout`.
    ///
    /// With `verify`, the settling delay is awaited without holding a thread.
    /// If the deadline falls inside the settling delay the switch fails with
    /// [`Error::SwitchTimedOut`] rather than skipping verification.
    pub async fn switch(
        &self,
        target: &ConnectionMatrix,
        verify: bool,
        timeout: Duration,
    ) -> Result<ConnectionMatrix, S::Error> {
        let deadline = Instant::now() + timeout;
        let _operation = self.begin(deadline).await?;
        let target = target.clone();

        if !verify {
            return self
                .run_until(deadline, move |session| session.switch(&target, false))
                .await;
        }

        let pending = self
            .run_until(deadline, move |session| session.transmit(&target))
            .await?;

        let settling = tokio::time::sleep(pending.remaining());
        if tokio::time::timeout_at(deadline, settling).await.is_err() {
            warn!("Switch timeout expired while relays were settling");
            self.interrupted.store(true, Ordering::Release);
            return Err(Error::SwitchTimedOut);
        }

        self.run_until(deadline, move |session| session.verify(pending))
            .await
    }

    /// Last known relay states, or `None` while an exchange holds the session.
    pub fn matrix(&self) -> Option<ConnectionMatrix> {
        self.session.try_lock().map(|session| session.matrix().clone())
    }

    /// True if the stored matrix may not match the relays.
    pub fn is_stale(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
            || self.session.try_lock().is_none_or(|session| session.is_stale())
    }

    /// Take the session back. Returns `None` while an abandoned exchange is
    /// still running.
    pub fn into_inner(self) -> Option<InstrumentSession<S, L>> {
        let interrupted = self.interrupted.load(Ordering::Acquire);
        let mut session = Arc::try_unwrap(self.session).ok()?.into_inner();
        if interrupted {
            session.mark_stale();
        }
        Some(session)
    }

    /// Wait for any other operation to finish, but not past `deadline`.
    async fn begin(&self, deadline: Instant) -> Result<tokio::sync::MutexGuard<'_, ()>, S::Error> {
        tokio::time::timeout_at(deadline, self.operation.lock())
            .await
            .map_err(|_| {
                warn!("Timed out waiting for another operation to finish");
                Error::Timeout
            })
    }

    async fn run_until<T, F>(&self, deadline: Instant, op: F) -> Result<T, S::Error>
    where
        T: Send + 'static,
        F: FnOnce(&mut InstrumentSession<S, L>) -> Result<T, S::Error> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        let interrupted = Arc::clone(&self.interrupted);
        let task = tokio::task::spawn_blocking(move || {
            let mut session = session.lock();
            if interrupted.swap(false, Ordering::AcqRel) {
                session.mark_stale();
            }
            let result = op(&mut *session);
            // The caller may have given up while we were busy.
            if interrupted.swap(false, Ordering::AcqRel) {
                session.mark_stale();
            }
            result
        });

        match tokio::time::timeout_at(deadline, task).await {
            Ok(joined) => join_result(joined),
            Err(_) => {
                warn!("Timed out waiting for the instrument");
                self.interrupted.store(true, Ordering::Release);
                Err(Error::Timeout)
            }
        }
    }
}

fn join_result<T, I: embedded_io::Error>(
    joined: core::result::Result<Result<T, I>, JoinError>,
) -> Result<T, I> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(Error::Cancelled),
    }
}
