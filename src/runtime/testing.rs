//! Scripted engine fakes for runtime tests
//!
//! Services are described by per-attempt scripts (start delay, exit
//! behavior) plus a probe timeline relative to the runner's creation.
//! Combined with tokio's paused clock this gives fully deterministic
//! simulated-time scenarios.

use crate::domain::{
    Condition, DependencyEdge, HealthCheck, NetworkSpec, ProbeCommand, RestartPolicy, ServiceSpec,
    StackSpec, VolumeSpec,
};
use crate::runtime::runner::{
    ExitSummary, ProbeOutcome, Provisioner, ServiceHandle, ServiceRunner,
};
use crate::runtime::StackSnapshot;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
enum FakeExit {
    Never,
    After { delay: Duration, failed: bool },
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    start_delay: Duration,
    exit: FakeExit,
}

/// Behavior of one scripted service. Attempt `n` uses the `n`-th entry,
/// with the last entry repeating for all later attempts.
#[derive(Debug, Clone)]
pub(crate) struct ServiceScript {
    attempts: Vec<Attempt>,
    /// Probes succeed from this offset (relative to runner creation);
    /// `None` means no probe ever succeeds
    healthy_after: Option<Duration>,
    /// Probes fail inside this window even after `healthy_after`
    unhealthy_window: Option<(Duration, Duration)>,
}

impl Default for ServiceScript {
    fn default() -> Self {
        Self::running()
    }
}

impl ServiceScript {
    /// Starts immediately, runs until stopped, probes healthy from t=0.
    pub fn running() -> Self {
        Self {
            attempts: vec![Attempt {
                start_delay: Duration::ZERO,
                exit: FakeExit::Never,
            }],
            healthy_after: Some(Duration::ZERO),
            unhealthy_window: None,
        }
    }

    /// Every attempt exits after `delay` with the given failure flag.
    pub fn exits_after(delay: Duration, failed: bool) -> Self {
        Self {
            attempts: vec![Attempt {
                start_delay: Duration::ZERO,
                exit: FakeExit::After { delay, failed },
            }],
            healthy_after: Some(Duration::ZERO),
            unhealthy_window: None,
        }
    }

    /// First attempt exits after `delay`; later attempts run forever.
    pub fn first_attempt_exits(mut self, delay: Duration, failed: bool) -> Self {
        self.attempts = vec![
            Attempt {
                start_delay: Duration::ZERO,
                exit: FakeExit::After { delay, failed },
            },
            Attempt {
                start_delay: Duration::ZERO,
                exit: FakeExit::Never,
            },
        ];
        self
    }

    /// Delay every attempt's start by `delay`.
    pub fn start_after(mut self, delay: Duration) -> Self {
        for attempt in &mut self.attempts {
            attempt.start_delay = delay;
        }
        self
    }

    /// Probes succeed once `offset` has elapsed since runner creation.
    pub fn healthy_after(mut self, offset: Duration) -> Self {
        self.healthy_after = Some(offset);
        self
    }

    /// No probe ever succeeds.
    pub fn never_healthy(mut self) -> Self {
        self.healthy_after = None;
        self
    }

    /// Probes fail in `[from, to)` even after first success.
    pub fn unhealthy_between(mut self, from: Duration, to: Duration) -> Self {
        self.unhealthy_window = Some((from, to));
        self
    }
}

/// Scripted [`ServiceRunner`]. Unscripted services behave like
/// [`ServiceScript::running`].
pub(crate) struct FakeRunner {
    origin: Instant,
    scripts: Mutex<HashMap<String, ServiceScript>>,
    attempts_started: Mutex<HashMap<String, usize>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            scripts: Mutex::new(HashMap::new()),
            attempts_started: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_service(self, name: &str, script: ServiceScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), script);
        self
    }

    fn script_for(&self, name: &str) -> ServiceScript {
        self.scripts
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ServiceRunner for FakeRunner {
    async fn start(&self, spec: &ServiceSpec) -> Result<Box<dyn ServiceHandle>> {
        let script = self.script_for(&spec.name);
        let attempt_index = {
            let mut attempts = self.attempts_started.lock().unwrap();
            let counter = attempts.entry(spec.name.clone()).or_insert(0);
            let index = *counter;
            *counter += 1;
            index
        };
        let attempt = script.attempts[attempt_index.min(script.attempts.len() - 1)];

        tokio::time::sleep(attempt.start_delay).await;

        let exit_at = match attempt.exit {
            FakeExit::Never => None,
            FakeExit::After { delay, failed } => Some((Instant::now() + delay, failed)),
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        Ok(Box::new(FakeHandle {
            exit_at,
            stop_tx,
            stop_rx,
        }))
    }

    async fn probe(&self, spec: &ServiceSpec, _check: &HealthCheck) -> ProbeOutcome {
        let script = self.script_for(&spec.name);
        let elapsed = self.origin.elapsed();

        if let Some((from, to)) = script.unhealthy_window {
            if elapsed >= from && elapsed < to {
                return ProbeOutcome::Unhealthy;
            }
        }
        match script.healthy_after {
            Some(offset) if elapsed >= offset => ProbeOutcome::Healthy,
            _ => ProbeOutcome::Unhealthy,
        }
    }
}

struct FakeHandle {
    exit_at: Option<(Instant, bool)>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

#[async_trait]
impl ServiceHandle for FakeHandle {
    async fn wait(&mut self) -> ExitSummary {
        if *self.stop_rx.borrow() {
            return ExitSummary {
                success: true,
                code: Some(0),
            };
        }
        match self.exit_at {
            None => {
                let _ = self.stop_rx.changed().await;
                ExitSummary {
                    success: true,
                    code: Some(0),
                }
            }
            Some((deadline, failed)) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => ExitSummary {
                        success: !failed,
                        code: Some(if failed { 1 } else { 0 }),
                    },
                    _ = self.stop_rx.changed() => ExitSummary {
                        success: true,
                        code: Some(0),
                    },
                }
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        let _ = self.stop_tx.send(true);
        Ok(())
    }
}

/// Records provisioning calls, and for each removal whether every
/// instance had already reached Stopped at that moment.
#[derive(Default)]
pub(crate) struct FakeProvisioner {
    log: Mutex<Vec<String>>,
    snapshots: Mutex<Option<watch::Receiver<StackSnapshot>>>,
    stopped_at_removal: Mutex<Vec<bool>>,
}

impl FakeProvisioner {
    pub fn observe(&self, snapshots: watch::Receiver<StackSnapshot>) {
        *self.snapshots.lock().unwrap() = Some(snapshots);
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn all_stopped_at_each_removal(&self) -> bool {
        let flags = self.stopped_at_removal.lock().unwrap();
        !flags.is_empty() && flags.iter().all(|stopped| *stopped)
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn record_removal(&self, entry: String) {
        self.record(entry);
        let all_stopped = self
            .snapshots
            .lock()
            .unwrap()
            .as_ref()
            .map(|rx| {
                rx.borrow()
                    .services
                    .values()
                    .all(|s| s.state == crate::domain::ServiceState::Stopped)
            })
            .unwrap_or(false);
        self.stopped_at_removal.lock().unwrap().push(all_stopped);
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn ensure_volume(&self, volume: &VolumeSpec) -> Result<()> {
        self.record(format!("ensure_volume {}", volume.name));
        Ok(())
    }

    async fn remove_volume(&self, volume: &VolumeSpec) -> Result<()> {
        self.record_removal(format!("remove_volume {}", volume.name));
        Ok(())
    }

    async fn ensure_network(&self, network: &NetworkSpec) -> Result<()> {
        self.record(format!("ensure_network {}", network.name));
        Ok(())
    }

    async fn remove_network(&self, network: &NetworkSpec) -> Result<()> {
        self.record_removal(format!("remove_network {}", network.name));
        Ok(())
    }
}

/// Bare service template for tests.
pub(crate) fn service_spec(name: &str) -> ServiceSpec {
    ServiceSpec {
        name: name.to_string(),
        image: format!("{name}:test"),
        command: vec![],
        environment: BTreeMap::new(),
        mounts: vec![],
        networks: vec![],
        ports: vec![],
        depends_on: vec![],
        restart: RestartPolicy::No,
        healthcheck: None,
    }
}

pub(crate) fn with_dep(mut spec: ServiceSpec, target: &str, condition: Condition) -> ServiceSpec {
    spec.depends_on.push(DependencyEdge {
        target: target.to_string(),
        condition,
    });
    spec
}

pub(crate) fn with_check(mut spec: ServiceSpec, interval: Duration, retries: u32) -> ServiceSpec {
    spec.healthcheck = Some(HealthCheck {
        command: ProbeCommand::shell("true"),
        interval,
        retries,
        timeout: Duration::from_secs(30),
    });
    spec
}

pub(crate) fn stack_of(name: &str, services: Vec<ServiceSpec>) -> StackSpec {
    StackSpec {
        name: name.to_string(),
        services: services.into_iter().map(|s| (s.name.clone(), s)).collect(),
        volumes: vec![],
        networks: vec![],
    }
}
