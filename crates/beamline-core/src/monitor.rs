//! Background monitor threads.
//!
//! A driver that polls hardware asynchronously owns one [`MonitorThread`]. Clients never
//! touch the hardware themselves: they write a [`MonitorCommand`] into a mutex-guarded slot
//! and signal a condition variable, and the monitor thread performs the transition through
//! its [`MonitorHandler`].
//!
//! ```text
//!  client threads                       monitor thread
//!  ──────────────                       ──────────────
//!  request(Start) ─┐                    initialize()
//!                  │  lock, write slot  status := Idle  ──► creator stops polling
//!                  └─ notify ─────────► wait (no timeout while idle)
//!                                       take command, dispatch, status := Acquiring
//!  status()  ◄──── AtomicU8 ─────────── poll() every poll_interval while acquiring
//!  shutdown() ── Terminate, notify ───► handler.shutdown(), status := Terminated, exit
//!            ── join ◄─────────────────┘
//! ```
//!
//! Commands coalesce: if several arrive before the thread wakes, only the last one is acted
//! upon. `Terminate` is sticky and refuses every later request. The status word is an atomic
//! so "is this device busy" never needs the lock.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, CoreResult};

/// Interval at which the creator re-reads the status word during startup.
const STARTUP_POLL: Duration = Duration::from_millis(1);

/// Status published by a monitor thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MonitorStatus {
    NotInitialized = 0,
    Idle = 1,
    Acquiring = 2,
    Error = 3,
    Terminated = 4,
}

impl MonitorStatus {
    /// Encoding stored in the shared status atomic.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a status atomic. Unknown values read as `NotInitialized`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => MonitorStatus::Idle,
            2 => MonitorStatus::Acquiring,
            3 => MonitorStatus::Error,
            4 => MonitorStatus::Terminated,
            _ => MonitorStatus::NotInitialized,
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MonitorStatus::NotInitialized => "not_initialized",
            MonitorStatus::Idle => "idle",
            MonitorStatus::Acquiring => "acquiring",
            MonitorStatus::Error => "error",
            MonitorStatus::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Transition requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    Start,
    Stop,
    Clear,
    Terminate,
}

/// Result of one acquisition poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Continue,
    /// Acquisition completed; the thread returns to idle.
    Finished,
}

/// Device-side behavior run on the monitor thread.
pub trait MonitorHandler: Send + 'static {
    /// Runs on the new thread before it reports ready.
    fn initialize(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn start(&mut self) -> CoreResult<()>;

    fn stop(&mut self) -> CoreResult<()>;

    fn clear(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// Called every poll interval while acquiring.
    fn poll(&mut self) -> CoreResult<PollOutcome> {
        Ok(PollOutcome::Continue)
    }

    /// Runs once after `Terminate`, on the monitor thread.
    fn shutdown(&mut self) {}
}

/// Timing of monitor threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// How long `spawn` waits for the thread to publish `Idle`.
    pub startup_timeout: Duration,
    /// Poll period while acquiring.
    pub poll_interval: Duration,
    pub thread_name: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            thread_name: "beamline-monitor".to_string(),
        }
    }
}

impl MonitorConfig {
    /// A copy of this config with a different thread name.
    pub fn with_thread_name(&self, name: impl Into<String>) -> Self {
        Self {
            thread_name: name.into(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Default)]
struct CommandSlot {
    pending: Option<MonitorCommand>,
    terminate: bool,
    /// A command has been taken and is being dispatched.
    dispatching: bool,
}

struct Shared {
    slot: Mutex<CommandSlot>,
    wake: Condvar,
    settled: Condvar,
    status: AtomicU8,
    startup_error: Mutex<Option<CoreError>>,
}

impl Shared {
    fn status(&self) -> MonitorStatus {
        MonitorStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: MonitorStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }
}

/// Lock-free view of a monitor's status, usable from any thread.
#[derive(Clone)]
pub struct StatusProbe {
    shared: Arc<Shared>,
}

impl StatusProbe {
    /// Latest status published by the thread.
    pub fn status(&self) -> MonitorStatus {
        self.shared.status()
    }

    /// Poll until the status equals `expected` or `timeout` elapses.
    pub fn wait_for(&self, expected: MonitorStatus, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.status() != expected {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(STARTUP_POLL);
        }
        true
    }
}

/// Handle to a running monitor thread. Dropping it shuts the thread down.
pub struct MonitorThread {
    name: String,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl MonitorThread {
    /// Spawn the thread and wait, bounded by `config.startup_timeout`, until it is ready.
    ///
    /// If the handler's `initialize` fails, the thread is joined and its error returned. On
    /// timeout `Terminate` is posted so the thread exits once initialization returns, and
    /// `SynchronizationFailure` is returned.
    pub fn spawn<H: MonitorHandler>(handler: H, config: &MonitorConfig) -> CoreResult<Self> {
        let shared = Arc::new(Shared {
            slot: Mutex::new(CommandSlot::default()),
            wake: Condvar::new(),
            settled: Condvar::new(),
            status: AtomicU8::new(MonitorStatus::NotInitialized.as_u8()),
            startup_error: Mutex::new(None),
        });
        let name = config.thread_name.clone();
        let thread_shared = Arc::clone(&shared);
        let thread_name = name.clone();
        let interval = config.poll_interval;
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(thread_shared, handler, interval, thread_name))
            .map_err(|e| {
                CoreError::SynchronizationFailure(format!(
                    "failed to spawn monitor thread '{}': {}",
                    name, e
                ))
            })?;

        let deadline = Instant::now() + config.startup_timeout;
        while shared.status() == MonitorStatus::NotInitialized {
            if handle.is_finished() {
                break;
            }
            if Instant::now() >= deadline {
                shared.slot.lock().terminate = true;
                shared.wake.notify_all();
                warn!(monitor = %name, timeout = ?config.startup_timeout, "Monitor thread did not start in time");
                return Err(CoreError::SynchronizationFailure(format!(
                    "monitor thread '{}' did not start within {:?}",
                    name, config.startup_timeout
                )));
            }
            thread::sleep(STARTUP_POLL);
        }

        let startup_error = shared.startup_error.lock().take();
        if startup_error.is_some() || shared.status() == MonitorStatus::NotInitialized {
            let joined = handle.join();
            return Err(match (startup_error, joined) {
                (Some(err), _) => err,
                (None, Err(_)) => CoreError::SynchronizationFailure(format!(
                    "monitor thread '{}' panicked during startup",
                    name
                )),
                (None, Ok(())) => CoreError::SynchronizationFailure(format!(
                    "monitor thread '{}' exited during startup",
                    name
                )),
            });
        }

        debug!(monitor = %name, "Monitor thread ready");
        Ok(Self {
            name,
            shared,
            handle: Some(handle),
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status, read without taking the command lock.
    pub fn status(&self) -> MonitorStatus {
        self.shared.status()
    }

    /// A cloneable status reader that outlives borrows of this handle.
    pub fn probe(&self) -> StatusProbe {
        StatusProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Post a command and wake the thread. The last command posted before the thread
    /// wakes wins.
    pub fn request(&self, command: MonitorCommand) -> CoreResult<()> {
        let mut slot = self.shared.slot.lock();
        if slot.terminate {
            return Err(CoreError::SynchronizationFailure(format!(
                "monitor thread '{}' is terminating",
                self.name
            )));
        }
        match command {
            MonitorCommand::Terminate => {
                slot.terminate = true;
                slot.pending = None;
            }
            other => slot.pending = Some(other),
        }
        drop(slot);
        self.shared.wake.notify_one();
        self.shared.settled.notify_all();
        Ok(())
    }

    /// Post `Start`.
    pub fn start(&self) -> CoreResult<()> {
        self.request(MonitorCommand::Start)
    }

    /// Post `Stop`.
    pub fn stop(&self) -> CoreResult<()> {
        self.request(MonitorCommand::Stop)
    }

    /// Post `Clear`.
    pub fn clear(&self) -> CoreResult<()> {
        self.request(MonitorCommand::Clear)
    }

    /// Wait until every posted command has been dispatched, then return the status.
    ///
    /// Once `Terminate` is posted, commands still pending are discarded and only a command
    /// already being dispatched is waited for.
    pub fn settle(&self, timeout: Duration) -> CoreResult<MonitorStatus> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        while slot.dispatching
            || (slot.pending.is_some()
                && !slot.terminate
                && self.shared.status() != MonitorStatus::Terminated)
        {
            if self
                .shared
                .settled
                .wait_until(&mut slot, deadline)
                .timed_out()
            {
                return Err(CoreError::SynchronizationFailure(format!(
                    "monitor thread '{}' did not settle within {:?}",
                    self.name, timeout
                )));
            }
        }
        Ok(self.shared.status())
    }

    /// Post `Terminate`, wake the thread and join it. Idempotent.
    pub fn shutdown(&mut self) -> CoreResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        {
            let mut slot = self.shared.slot.lock();
            slot.terminate = true;
            slot.pending = None;
        }
        self.shared.wake.notify_all();
        self.shared.settled.notify_all();
        handle.join().map_err(|_| {
            CoreError::SynchronizationFailure(format!("monitor thread '{}' panicked", self.name))
        })?;
        info!(monitor = %self.name, "Monitor thread joined");
        Ok(())
    }
}

impl Drop for MonitorThread {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!(monitor = %self.name, error = %err, "Monitor thread shutdown failed");
        }
    }
}

impl fmt::Debug for MonitorThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorThread")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

fn run<H: MonitorHandler>(shared: Arc<Shared>, mut handler: H, interval: Duration, name: String) {
    if let Err(err) = handler.initialize() {
        error!(monitor = %name, error = %err, "Monitor initialization failed");
        *shared.startup_error.lock() = Some(err);
        shared.set_status(MonitorStatus::Terminated);
        return;
    }
    shared.set_status(MonitorStatus::Idle);

    let mut slot = shared.slot.lock();
    loop {
        if slot.terminate {
            slot.pending = None;
            break;
        }
        if let Some(command) = slot.pending.take() {
            slot.dispatching = true;
            MutexGuard::unlocked(&mut slot, || dispatch(&shared, &mut handler, command, &name));
            slot.dispatching = false;
            shared.settled.notify_all();
            continue;
        }
        if shared.status() != MonitorStatus::Acquiring {
            shared.wake.wait(&mut slot);
            continue;
        }
        shared.wake.wait_for(&mut slot, interval);
        if slot.pending.is_some() || slot.terminate {
            continue;
        }
        let outcome = MutexGuard::unlocked(&mut slot, || handler.poll());
        match outcome {
            Ok(PollOutcome::Continue) => {}
            Ok(PollOutcome::Finished) => shared.set_status(MonitorStatus::Idle),
            Err(err) => {
                error!(monitor = %name, error = %err, "Monitor poll failed");
                shared.set_status(MonitorStatus::Error);
            }
        }
    }
    drop(slot);

    handler.shutdown();
    shared.set_status(MonitorStatus::Terminated);
    shared.settled.notify_all();
    debug!(monitor = %name, "Monitor thread exiting");
}

fn dispatch<H: MonitorHandler>(shared: &Shared, handler: &mut H, command: MonitorCommand, name: &str) {
    let (result, next) = match command {
        MonitorCommand::Start => (handler.start(), MonitorStatus::Acquiring),
        MonitorCommand::Stop => (handler.stop(), MonitorStatus::Idle),
        MonitorCommand::Clear => {
            let next = match shared.status() {
                MonitorStatus::Error => MonitorStatus::Idle,
                current => current,
            };
            (handler.clear(), next)
        }
        MonitorCommand::Terminate => return,
    };
    match result {
        Ok(()) => shared.set_status(next),
        Err(err) => {
            error!(monitor = %name, command = ?command, error = %err, "Monitor command failed");
            shared.set_status(MonitorStatus::Error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        starts: Arc<AtomicUsize>,
        fail_start: bool,
    }

    impl MonitorHandler for Counting {
        fn start(&mut self) -> CoreResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(CoreError::SynchronizationFailure("device offline".into()));
            }
            Ok(())
        }

        fn stop(&mut self) -> CoreResult<()> {
            Ok(())
        }
    }

    struct FailingInit;

    impl MonitorHandler for FailingInit {
        fn initialize(&mut self) -> CoreResult<()> {
            Err(CoreError::Config("no device".into()))
        }
        fn start(&mut self) -> CoreResult<()> {
            Ok(())
        }
        fn stop(&mut self) -> CoreResult<()> {
            Ok(())
        }
    }

    struct SlowInit(Duration);

    impl MonitorHandler for SlowInit {
        fn initialize(&mut self) -> CoreResult<()> {
            thread::sleep(self.0);
            Ok(())
        }
        fn start(&mut self) -> CoreResult<()> {
            Ok(())
        }
        fn stop(&mut self) -> CoreResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_spawn_reports_idle() {
        let monitor = MonitorThread::spawn(Counting::default(), &MonitorConfig::default()).unwrap();
        assert_eq!(monitor.status(), MonitorStatus::Idle);
    }

    #[test]
    fn test_start_stop_transitions() {
        let monitor = MonitorThread::spawn(Counting::default(), &MonitorConfig::default()).unwrap();
        monitor.start().unwrap();
        assert_eq!(monitor.settle(Duration::from_secs(2)).unwrap(), MonitorStatus::Acquiring);
        monitor.stop().unwrap();
        assert_eq!(monitor.settle(Duration::from_secs(2)).unwrap(), MonitorStatus::Idle);
    }

    #[test]
    fn test_failed_command_keeps_thread_alive() {
        let handler = Counting {
            fail_start: true,
            ..Counting::default()
        };
        let starts = Arc::clone(&handler.starts);
        let monitor = MonitorThread::spawn(handler, &MonitorConfig::default()).unwrap();

        monitor.start().unwrap();
        assert_eq!(monitor.settle(Duration::from_secs(2)).unwrap(), MonitorStatus::Error);
        monitor.start().unwrap();
        monitor.settle(Duration::from_secs(2)).unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 2);

        monitor.clear().unwrap();
        assert_eq!(monitor.settle(Duration::from_secs(2)).unwrap(), MonitorStatus::Idle);
    }

    #[test]
    fn test_initialize_failure_is_returned() {
        let err = MonitorThread::spawn(FailingInit, &MonitorConfig::default()).unwrap_err();
        assert!(err.to_string().contains("no device"));
    }

    #[test]
    fn test_startup_timeout_is_bounded() {
        let config = MonitorConfig {
            startup_timeout: Duration::from_millis(20),
            ..MonitorConfig::default()
        };
        let began = Instant::now();
        let err = MonitorThread::spawn(SlowInit(Duration::from_millis(300)), &config).unwrap_err();
        assert!(matches!(err, CoreError::SynchronizationFailure(_)));
        assert!(began.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn test_terminate_is_sticky() {
        let mut monitor =
            MonitorThread::spawn(Counting::default(), &MonitorConfig::default()).unwrap();
        let probe = monitor.probe();
        monitor.request(MonitorCommand::Terminate).unwrap();
        assert!(monitor.start().is_err());
        monitor.shutdown().unwrap();
        assert_eq!(probe.status(), MonitorStatus::Terminated);
        monitor.shutdown().unwrap();
    }
}
