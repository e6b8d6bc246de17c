//! Command handshake and teardown of monitor threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beamline_core::monitor::{MonitorCommand, PollOutcome};
use beamline_core::prelude::*;
use beamline_core::{MonitorHandler, MonitorThread};

const SETTLE: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
struct Counters {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    polls: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

struct Detector {
    counters: Counters,
}

impl MonitorHandler for Detector {
    fn start(&mut self) -> CoreResult<()> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> CoreResult<()> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn poll(&mut self) -> CoreResult<PollOutcome> {
        self.counters.polls.fetch_add(1, Ordering::SeqCst);
        Ok(PollOutcome::Continue)
    }

    fn shutdown(&mut self) {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

fn spawn(counters: &Counters) -> anyhow::Result<MonitorThread> {
    let config = MonitorConfig::default().with_thread_name("detector");
    Ok(MonitorThread::spawn(
        Detector {
            counters: counters.clone(),
        },
        &config,
    )?)
}

#[test]
fn test_start_stop_start_handshake_repeats() -> anyhow::Result<()> {
    let counters = Counters::default();
    let monitor = spawn(&counters)?;
    assert_eq!(monitor.status(), MonitorStatus::Idle);

    for _ in 0..1000 {
        monitor.start()?;
        monitor.stop()?;
        monitor.start()?;
        assert_eq!(monitor.settle(SETTLE)?, MonitorStatus::Acquiring);

        monitor.stop()?;
        assert_eq!(monitor.settle(SETTLE)?, MonitorStatus::Idle);
    }

    // Coalescing may drop intermediate commands, never the last one.
    let starts = counters.starts.load(Ordering::SeqCst);
    assert!((1000..=2000).contains(&starts), "starts = {starts}");
    assert!(counters.stops.load(Ordering::SeqCst) >= 1000);
    Ok(())
}

#[test]
fn test_acquiring_thread_polls_and_idle_thread_does_not() -> anyhow::Result<()> {
    let counters = Counters::default();
    let monitor = spawn(&counters)?;

    monitor.start()?;
    monitor.settle(SETTLE)?;
    std::thread::sleep(Duration::from_millis(100));
    monitor.stop()?;
    monitor.settle(SETTLE)?;
    let polled = counters.polls.load(Ordering::SeqCst);
    assert!(polled > 0);

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(counters.polls.load(Ordering::SeqCst), polled);
    Ok(())
}

#[test]
fn test_teardown_joins_and_refuses_later_commands() -> anyhow::Result<()> {
    let counters = Counters::default();
    let mut monitor = spawn(&counters)?;
    let probe = monitor.probe();
    monitor.start()?;

    monitor.shutdown()?;
    assert_eq!(probe.status(), MonitorStatus::Terminated);
    assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);

    let err = monitor.request(MonitorCommand::Start).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SynchronizationFailure);

    monitor.shutdown()?;
    drop(monitor);
    assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_repeated_spawn_and_drop() -> anyhow::Result<()> {
    let counters = Counters::default();
    for _ in 0..100 {
        let monitor = spawn(&counters)?;
        monitor.start()?;
    }
    assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 100);
    Ok(())
}

#[test]
fn test_concurrent_clients_race_start_stop_start() -> anyhow::Result<()> {
    let counters = Counters::default();
    let monitor = spawn(&counters)?;

    std::thread::scope(|scope| -> anyhow::Result<()> {
        let clients: Vec<_> = (0..3)
            .map(|_| {
                let monitor = &monitor;
                scope.spawn(move || -> CoreResult<()> {
                    for _ in 0..1000 {
                        monitor.start()?;
                        monitor.stop()?;
                        monitor.start()?;
                        monitor.settle(SETTLE)?;
                    }
                    Ok(())
                })
            })
            .collect();
        for client in clients {
            client
                .join()
                .map_err(|_| anyhow::anyhow!("client thread panicked"))??;
        }
        Ok(())
    })?;

    // Every client finished on `start`, so the last command dispatched was a start.
    assert_eq!(monitor.settle(SETTLE)?, MonitorStatus::Acquiring);
    assert!(counters.starts.load(Ordering::SeqCst) >= 1);
    Ok(())
}

#[test]
fn test_settle_after_terminate_does_not_wait_for_discarded_commands() -> anyhow::Result<()> {
    let counters = Counters::default();
    let mut monitor = spawn(&counters)?;

    for _ in 0..100 {
        monitor.start()?;
        monitor.stop()?;
    }
    monitor.start()?;
    monitor.request(MonitorCommand::Terminate)?;
    let status = monitor.settle(Duration::from_millis(300))?;
    assert_ne!(status, MonitorStatus::NotInitialized);

    monitor.shutdown()?;
    assert_eq!(monitor.settle(Duration::from_millis(300))?, MonitorStatus::Terminated);
    assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    Ok(())
}
