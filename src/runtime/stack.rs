//! Stack controller
//!
//! The single logical coordinator: it owns the registry, consumes the
//! event stream, releases gated services, reacts to exits and probe
//! results, and holds the join barrier on teardown. Service processes and
//! health probes run as independent tasks; the only cross-instance
//! synchronization is the dependency gate reading registry snapshots.

use crate::domain::{ServiceState, StackSpec};
use crate::runtime::events::StackEvent;
use crate::runtime::runner::{Provisioner, ServiceRunner};
use crate::runtime::{gate, health, status, supervisor, StackRegistry, StackSnapshot};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Controller knobs supplied by the caller.
#[derive(Debug, Default)]
pub struct StackOptions {
    /// Where to persist state snapshots, if anywhere
    pub state_file: Option<PathBuf>,
    /// Remove named volumes after the join barrier. Off for `up`:
    /// volumes survive every failure path and ordinary teardown.
    pub remove_volumes_on_teardown: bool,
}

/// Outcome of one controller run.
#[derive(Debug)]
pub struct StackReport {
    /// Services that exhausted their bring-up probe budget
    pub bring_up_failures: Vec<String>,
    /// Services abandoned by the restart supervisor
    pub gave_up: Vec<String>,
    pub final_state: StackSnapshot,
}

impl StackReport {
    pub fn is_clean(&self) -> bool {
        self.bring_up_failures.is_empty() && self.gave_up.is_empty()
    }
}

/// Caller-side handle: request teardown, observe state snapshots.
#[derive(Clone)]
pub struct StackHandle {
    tx: mpsc::UnboundedSender<StackEvent>,
    snapshots: watch::Receiver<StackSnapshot>,
}

impl StackHandle {
    /// Broadcast a teardown request for the whole stack.
    pub fn shutdown(&self) {
        let _ = self.tx.send(StackEvent::Shutdown);
    }

    pub fn snapshots(&self) -> watch::Receiver<StackSnapshot> {
        self.snapshots.clone()
    }
}

pub struct StackController {
    stack: StackSpec,
    options: StackOptions,
    registry: StackRegistry,
    runner: Arc<dyn ServiceRunner>,
    provisioner: Arc<dyn Provisioner>,
    tx: mpsc::UnboundedSender<StackEvent>,
    rx: mpsc::UnboundedReceiver<StackEvent>,
    snapshot_tx: watch::Sender<StackSnapshot>,
    stop_signals: HashMap<String, watch::Sender<bool>>,
    probe_cancels: HashMap<String, watch::Sender<bool>>,
    shutting_down: bool,
    bring_up_failures: Vec<String>,
    gave_up: Vec<String>,
}

impl StackController {
    pub fn new(
        stack: StackSpec,
        runner: Arc<dyn ServiceRunner>,
        provisioner: Arc<dyn Provisioner>,
        options: StackOptions,
    ) -> (Self, StackHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = StackRegistry::new(stack.services.keys());
        let (snapshot_tx, snapshot_rx) = watch::channel(registry.snapshot());

        let handle = StackHandle {
            tx: tx.clone(),
            snapshots: snapshot_rx,
        };
        let controller = Self {
            stack,
            options,
            registry,
            runner,
            provisioner,
            tx,
            rx,
            snapshot_tx,
            stop_signals: HashMap::new(),
            probe_cancels: HashMap::new(),
            shutting_down: false,
            bring_up_failures: Vec::new(),
            gave_up: Vec::new(),
        };
        (controller, handle)
    }

    /// Provision shared resources, bring the stack up, and run the event
    /// loop until teardown completes or every service has drained.
    pub async fn run(mut self) -> Result<StackReport> {
        self.provision().await?;

        info!(
            "Starting stack '{}' ({} services)",
            self.stack.name,
            self.stack.services.len()
        );
        self.release_eligible();
        self.publish();

        while let Some(event) = self.rx.recv().await {
            self.handle_event(event);
            self.publish();
            if self.finished() {
                break;
            }
        }

        self.teardown_shared().await?;

        Ok(StackReport {
            bring_up_failures: std::mem::take(&mut self.bring_up_failures),
            gave_up: std::mem::take(&mut self.gave_up),
            final_state: self.registry.snapshot(),
        })
    }

    async fn provision(&self) -> Result<()> {
        for network in &self.stack.networks {
            self.provisioner
                .ensure_network(network)
                .await
                .with_context(|| format!("Failed to provision network '{}'", network.name))?;
        }
        for volume in &self.stack.volumes {
            self.provisioner
                .ensure_volume(volume)
                .await
                .with_context(|| format!("Failed to provision volume '{}'", volume.name))?;
        }
        Ok(())
    }

    /// Join barrier: only reached once the event loop has observed every
    /// instance stopped (or the stack drained on its own). Volumes are
    /// only removed when the caller explicitly asked for it.
    async fn teardown_shared(&self) -> Result<()> {
        if !self.shutting_down {
            return Ok(());
        }
        for network in &self.stack.networks {
            self.provisioner
                .remove_network(network)
                .await
                .with_context(|| format!("Failed to remove network '{}'", network.name))?;
        }
        if self.options.remove_volumes_on_teardown {
            for volume in &self.stack.volumes {
                self.provisioner
                    .remove_volume(volume)
                    .await
                    .with_context(|| format!("Failed to remove volume '{}'", volume.name))?;
            }
        }
        Ok(())
    }

    fn finished(&self) -> bool {
        if self.shutting_down {
            self.registry.all_stopped()
        } else {
            self.registry.none_live()
        }
    }

    fn handle_event(&mut self, event: StackEvent) {
        match event {
            StackEvent::Running { service } => self.on_running(&service),
            StackEvent::StartFailed { service, error } => self.on_start_failed(&service, &error),
            StackEvent::Exited { service, failed } => self.on_exited(&service, failed),
            StackEvent::Probe { service, healthy } => self.on_probe(&service, healthy),
            StackEvent::ProbeBudgetExhausted { service } => self.on_budget_exhausted(&service),
            StackEvent::Shutdown => self.begin_shutdown(),
        }

        // Event-driven gate recheck: any upstream state change may have
        // unblocked a pending service
        if !self.shutting_down {
            self.release_eligible();
        }
        self.write_state_file();
    }

    fn release_eligible(&mut self) {
        let snapshot = self.registry.snapshot();
        for name in self.registry.services_in(ServiceState::Pending) {
            let Some(spec) = self.stack.services.get(&name) else {
                continue;
            };
            if gate::can_start(spec, &snapshot) {
                info!("Dependencies satisfied for '{}', starting", name);
                self.apply(&name, ServiceState::Starting);
                self.spawn_service(&name);
            }
        }
    }

    fn on_running(&mut self, service: &str) {
        if self.registry.state(service) != Some(ServiceState::Starting) {
            debug!("Stale running report for '{}', ignoring", service);
            return;
        }
        self.apply(service, ServiceState::Started);

        if self.shutting_down {
            // Teardown arrived mid-launch; the stop signal is already set
            self.apply(service, ServiceState::Stopping);
            return;
        }

        let spec = &self.stack.services[service];
        if spec.has_healthcheck() {
            self.spawn_probe(service);
        } else {
            // Health-less services synthesize HEALTHY on start, so
            // service_healthy dependents are satisfiable at all
            debug!("No health check for '{}', healthy on start", service);
            self.apply(service, ServiceState::Healthy);
        }
    }

    fn on_start_failed(&mut self, service: &str, error: &str) {
        warn!("Launch failed for '{}': {}", service, error);
        self.on_failure(service);
    }

    fn on_exited(&mut self, service: &str, failed: bool) {
        match self.registry.state(service) {
            Some(ServiceState::Stopping) => {
                self.cancel_probe(service);
                self.stop_signals.remove(service);
                self.apply(service, ServiceState::Stopped);
                info!("'{}' stopped", service);
            }
            Some(state) if state.is_live() => {
                if failed {
                    warn!("'{}' exited abnormally", service);
                    self.on_failure(service);
                } else {
                    // Voluntary clean exit: leave it stopped, never
                    // consult the supervisor
                    info!("'{}' exited cleanly", service);
                    self.cancel_probe(service);
                    self.stop_signals.remove(service);
                    self.apply(service, ServiceState::Stopping);
                    self.apply(service, ServiceState::Stopped);
                }
            }
            other => {
                debug!("Stale exit report for '{}' in {:?}, ignoring", service, other);
            }
        }
    }

    fn on_failure(&mut self, service: &str) {
        self.cancel_probe(service);
        self.stop_signals.remove(service);
        self.apply(service, ServiceState::Failed);

        if self.shutting_down {
            self.apply(service, ServiceState::Stopped);
            return;
        }

        let policy = self.stack.services[service].restart;
        let restarts = self.registry.restart_count(service);
        match supervisor::decide(policy, restarts) {
            supervisor::RestartDecision::Restart => {
                self.registry.note_restart(service);
                info!("Restarting '{}' (restart {})", service, restarts + 1);
                self.apply(service, ServiceState::Starting);
                self.spawn_service(service);
            }
            supervisor::RestartDecision::GiveUp => {
                error!("Giving up on '{}' after {} restart(s)", service, restarts);
                self.gave_up.push(service.to_string());
            }
        }
    }

    fn on_probe(&mut self, service: &str, healthy: bool) {
        match (self.registry.state(service), healthy) {
            (Some(ServiceState::Started), true) => {
                info!("'{}' became healthy", service);
                self.registry.record_probe(service, healthy);
                self.apply(service, ServiceState::Healthy);
            }
            (Some(ServiceState::Healthy), false) => {
                warn!("'{}' became unhealthy", service);
                self.registry.record_probe(service, healthy);
                self.apply(service, ServiceState::Unhealthy);
            }
            (Some(ServiceState::Unhealthy), true) => {
                info!("'{}' recovered", service);
                self.registry.record_probe(service, healthy);
                self.apply(service, ServiceState::Healthy);
            }
            (Some(ServiceState::Healthy), true) | (Some(ServiceState::Unhealthy), false) => {
                self.registry.record_probe(service, healthy);
            }
            (other, _) => {
                debug!("Stale probe for '{}' in {:?}, ignoring", service, other);
            }
        }
    }

    fn on_budget_exhausted(&mut self, service: &str) {
        error!(
            "Bring-up failed for '{}': no successful probe within the retry budget",
            service
        );
        // The instance stays STARTED; its service_healthy dependents
        // never leave PENDING
        let blocked = self.stack.dependents_of(service);
        if !blocked.is_empty() {
            error!("Dependents never released: {}", blocked.join(", "));
        }
        self.registry.mark_bring_up_failed(service);
        self.bring_up_failures.push(service.to_string());
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        info!("Stopping stack '{}'", self.stack.name);

        for name in self.stack.services.keys().cloned().collect::<Vec<_>>() {
            self.cancel_probe(&name);
            match self.registry.state(&name) {
                Some(ServiceState::Pending) | Some(ServiceState::Failed) => {
                    self.apply(&name, ServiceState::Stopped);
                }
                Some(ServiceState::Started)
                | Some(ServiceState::Healthy)
                | Some(ServiceState::Unhealthy) => {
                    self.apply(&name, ServiceState::Stopping);
                    self.signal_stop(&name);
                }
                Some(ServiceState::Starting) => {
                    // The launch task will report Running; on_running
                    // routes it straight to Stopping
                    self.signal_stop(&name);
                }
                _ => {}
            }
        }
    }

    fn spawn_service(&mut self, service: &str) {
        let Some(spec) = self.stack.services.get(service).cloned() else {
            return;
        };
        let runner = Arc::clone(&self.runner);
        let tx = self.tx.clone();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        self.stop_signals.insert(service.to_string(), stop_tx);

        tokio::spawn(async move {
            let mut handle = match runner.start(&spec).await {
                Ok(handle) => handle,
                Err(err) => {
                    let _ = tx.send(StackEvent::StartFailed {
                        service: spec.name.clone(),
                        error: format!("{err:#}"),
                    });
                    return;
                }
            };
            let _ = tx.send(StackEvent::Running {
                service: spec.name.clone(),
            });

            let exited = tokio::select! {
                status = handle.wait() => Some(status),
                _ = stop_rx.changed() => None,
            };
            match exited {
                Some(status) => {
                    debug!("'{}' exited with code {:?}", spec.name, status.code);
                    let _ = tx.send(StackEvent::Exited {
                        service: spec.name.clone(),
                        failed: !status.success,
                    });
                }
                None => {
                    if let Err(err) = handle.stop().await {
                        warn!("Failed to stop '{}': {err:#}", spec.name);
                    }
                    let _ = handle.wait().await;
                    // A requested stop is clean whatever the exit status
                    let _ = tx.send(StackEvent::Exited {
                        service: spec.name.clone(),
                        failed: false,
                    });
                }
            }
        });
    }

    fn spawn_probe(&mut self, service: &str) {
        let Some(spec) = self.stack.services.get(service).cloned() else {
            return;
        };
        let Some(check) = spec.healthcheck.clone() else {
            return;
        };
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.probe_cancels.insert(service.to_string(), cancel_tx);
        health::spawn_monitor(spec, check, Arc::clone(&self.runner), self.tx.clone(), cancel_rx);
    }

    fn cancel_probe(&mut self, service: &str) {
        if let Some(cancel) = self.probe_cancels.remove(service) {
            let _ = cancel.send(true);
        }
    }

    fn signal_stop(&mut self, service: &str) {
        if let Some(stop) = self.stop_signals.get(service) {
            let _ = stop.send(true);
        }
    }

    /// Every registry mutation goes through here; stale or illegal
    /// transitions are dropped with a debug log rather than applied.
    fn apply(&mut self, service: &str, to: ServiceState) {
        if let Err(err) = self.registry.transition(service, to) {
            debug!("Dropped transition: {}", err);
        }
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(self.registry.snapshot());
    }

    fn write_state_file(&self) {
        if let Some(path) = &self.options.state_file {
            if let Err(err) = status::write(path, &self.stack.name, &self.registry.snapshot()) {
                warn!("Failed to write state file: {err:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, ServiceState::*};
    use crate::runtime::testing::{
        service_spec, stack_of, with_check, with_dep, FakeProvisioner, FakeRunner, ServiceScript,
    };
    use std::time::Duration;

    fn launch(
        stack: StackSpec,
        runner: FakeRunner,
    ) -> (
        tokio::task::JoinHandle<Result<StackReport>>,
        StackHandle,
        Arc<FakeProvisioner>,
    ) {
        launch_with_options(stack, runner, StackOptions::default())
    }

    fn launch_with_options(
        stack: StackSpec,
        runner: FakeRunner,
        options: StackOptions,
    ) -> (
        tokio::task::JoinHandle<Result<StackReport>>,
        StackHandle,
        Arc<FakeProvisioner>,
    ) {
        let provisioner = Arc::new(FakeProvisioner::default());
        let (controller, handle) =
            StackController::new(stack, Arc::new(runner), provisioner.clone(), options);
        provisioner.observe(handle.snapshots());
        let join = tokio::spawn(controller.run());
        (join, handle, provisioner)
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_dependent_released_at_first_probe_success() {
        let db = with_check(service_spec("db"), Duration::from_secs(1), 20);
        let backend = with_dep(service_spec("backend"), "db", Condition::Healthy);
        let runner = FakeRunner::new().with_service(
            "db",
            ServiceScript::running().healthy_after(Duration::from_millis(2500)),
        );

        let started = tokio::time::Instant::now();
        let (join, handle, _) = launch(stack_of("erp", vec![db, backend]), runner);

        let mut snaps = handle.snapshots();
        snaps
            .wait_for(|s| s.state_of("backend") != Some(Pending))
            .await
            .unwrap();

        // Released at the tick of the first success (3s), never earlier,
        // and only while db is actually healthy
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(snaps.borrow().state_of("db"), Some(Healthy));

        handle.shutdown();
        let report = join.await.unwrap().unwrap();
        assert!(report.is_clean());
        assert!(report.final_state.services.values().all(|s| s.state == Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bring_up_failure_keeps_dependent_pending() {
        let db = with_check(service_spec("db"), Duration::from_secs(1), 20);
        let backend = with_dep(service_spec("backend"), "db", Condition::Healthy);
        let runner =
            FakeRunner::new().with_service("db", ServiceScript::running().never_healthy());

        let started = tokio::time::Instant::now();
        let (join, handle, _) = launch(stack_of("erp", vec![db, backend]), runner);

        let mut snaps = handle.snapshots();
        snaps.wait_for(|s| s.bring_up_failed("db")).await.unwrap();

        // 20 failed probes at 1s intervals before the failure is declared
        assert_eq!(started.elapsed(), Duration::from_secs(20));
        assert_eq!(snaps.borrow().state_of("backend"), Some(Pending));
        assert_eq!(snaps.borrow().state_of("db"), Some(Started));

        handle.shutdown();
        let report = join.await.unwrap().unwrap();
        assert_eq!(report.bring_up_failures, vec!["db"]);
        assert_eq!(report.final_state.state_of("backend"), Some(Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_condition_ignores_health() {
        let db = with_check(service_spec("db"), Duration::from_secs(1), 20);
        let exporter = with_dep(service_spec("exporter"), "db", Condition::Started);
        let runner =
            FakeRunner::new().with_service("db", ServiceScript::running().never_healthy());

        let (join, handle, _) = launch(stack_of("erp", vec![db, exporter]), runner);

        let mut snaps = handle.snapshots();
        snaps
            .wait_for(|s| s.state_of("exporter") != Some(Pending))
            .await
            .unwrap();

        // db is merely Started (its probe never succeeds); that is enough
        assert_eq!(snaps.borrow().state_of("db"), Some(Started));

        handle.shutdown();
        join.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependent_waits_for_later_of_two_targets() {
        let runner = FakeRunner::new()
            .with_service(
                "backend",
                ServiceScript::running().start_after(Duration::from_secs(3)),
            )
            .with_service(
                "websocket",
                ServiceScript::running().start_after(Duration::from_secs(7)),
            );

        let frontend = with_dep(
            with_dep(service_spec("frontend"), "backend", Condition::Started),
            "websocket",
            Condition::Started,
        );
        let stack = stack_of(
            "erp",
            vec![service_spec("backend"), service_spec("websocket"), frontend],
        );

        let started = tokio::time::Instant::now();
        let (join, handle, _) = launch(stack, runner);

        let mut snaps = handle.snapshots();
        snaps
            .wait_for(|s| s.state_of("frontend") != Some(Pending))
            .await
            .unwrap();

        // Only after the later of the two (websocket at 7s)
        assert!(started.elapsed() >= Duration::from_secs(7));
        assert!(snaps.borrow().state_of("backend").unwrap().is_started());
        assert!(snaps.borrow().state_of("websocket").unwrap().is_started());

        handle.shutdown();
        join.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failure_one_restart() {
        let script = ServiceScript::running().first_attempt_exits(Duration::from_secs(5), true);
        let runner = FakeRunner::new().with_service("worker", script);

        let mut worker = service_spec("worker");
        worker.restart = crate::domain::RestartPolicy::OnFailure { max_retries: None };

        let (join, handle, _) = launch(stack_of("erp", vec![worker]), runner);

        let mut snaps = handle.snapshots();
        snaps
            .wait_for(|s| s.restart_count("worker") == 1 && s.state_of("worker") != Some(Pending))
            .await
            .unwrap();

        // No restart storm: a single failure produces exactly one restart
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.snapshots().borrow().restart_count("worker"), 1);
        assert!(handle
            .snapshots()
            .borrow()
            .state_of("worker")
            .unwrap()
            .is_started());

        handle.shutdown();
        let report = join.await.unwrap().unwrap();
        assert!(report.gave_up.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_exit_never_restarts() {
        let runner = FakeRunner::new().with_service(
            "migrate",
            ServiceScript::exits_after(Duration::from_secs(2), false),
        );
        let mut migrate = service_spec("migrate");
        migrate.restart = crate::domain::RestartPolicy::OnFailure { max_retries: None };

        let (join, _handle, _) = launch(stack_of("erp", vec![migrate]), runner);

        // The stack drains by itself: no shutdown call needed
        let report = join.await.unwrap().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.final_state.state_of("migrate"), Some(Stopped));
        assert_eq!(report.final_state.restart_count("migrate"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capped_restarts_give_up() {
        let runner = FakeRunner::new().with_service(
            "worker",
            ServiceScript::exits_after(Duration::from_secs(1), true),
        );
        let mut worker = service_spec("worker");
        worker.restart = crate::domain::RestartPolicy::OnFailure {
            max_retries: Some(2),
        };

        let (join, _handle, _) = launch(stack_of("erp", vec![worker]), runner);

        let report = join.await.unwrap().unwrap();
        assert_eq!(report.gave_up, vec!["worker"]);
        assert_eq!(report.final_state.restart_count("worker"), 2);
        assert_eq!(report.final_state.state_of("worker"), Some(Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_join_barrier_before_volume_release() {
        let queue_long = with_check(service_spec("queue-long"), Duration::from_secs(1), 5);
        let backend = with_dep(service_spec("backend"), "queue-long", Condition::Started);
        let runner = FakeRunner::new().with_service(
            "queue-long",
            ServiceScript::running().healthy_after(Duration::ZERO),
        );

        let mut stack = stack_of("erp", vec![queue_long, backend]);
        stack.volumes.push(crate::domain::VolumeSpec {
            name: "sites".to_string(),
            driver: "local".to_string(),
        });

        let options = StackOptions {
            state_file: None,
            remove_volumes_on_teardown: true,
        };
        let (join, handle, provisioner) = launch_with_options(stack, runner, options);

        let mut snaps = handle.snapshots();
        snaps
            .wait_for(|s| s.state_of("queue-long") == Some(Healthy))
            .await
            .unwrap();

        handle.shutdown();
        let report = join.await.unwrap().unwrap();
        assert!(report.final_state.services.values().all(|s| s.state == Stopped));

        // The volume was provisioned, and released only after every
        // instance had reached Stopped
        let log = provisioner.log();
        assert!(log.contains(&"ensure_volume sites".to_string()));
        assert!(log.contains(&"remove_volume sites".to_string()));
        assert!(provisioner.all_stopped_at_each_removal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_volumes_preserved_without_explicit_request() {
        let runner = FakeRunner::new();
        let mut stack = stack_of("erp", vec![service_spec("app")]);
        stack.volumes.push(crate::domain::VolumeSpec {
            name: "sites".to_string(),
            driver: "local".to_string(),
        });

        let (join, handle, provisioner) = launch(stack, runner);

        let mut snaps = handle.snapshots();
        snaps
            .wait_for(|s| s.state_of("app").map_or(false, |st| st.is_started()))
            .await
            .unwrap();

        handle.shutdown();
        join.await.unwrap().unwrap();

        let log = provisioner.log();
        assert!(log.contains(&"ensure_volume sites".to_string()));
        assert!(!log.iter().any(|l| l.starts_with("remove_volume")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_toggle_does_not_stop_service() {
        let db = with_check(service_spec("db"), Duration::from_secs(1), 5);
        let runner = FakeRunner::new().with_service(
            "db",
            ServiceScript::running()
                .healthy_after(Duration::ZERO)
                .unhealthy_between(Duration::from_secs(4), Duration::from_secs(6)),
        );

        let (join, handle, _) = launch(stack_of("erp", vec![db]), runner);

        let mut snaps = handle.snapshots();
        snaps
            .wait_for(|s| s.state_of("db") == Some(Unhealthy))
            .await
            .unwrap();

        // The flip back: UNHEALTHY does not halt the service, and each
        // later success toggles it straight back
        snaps
            .wait_for(|s| s.state_of("db") == Some(Healthy))
            .await
            .unwrap();

        handle.shutdown();
        let report = join.await.unwrap().unwrap();
        assert!(report.is_clean());
    }
}
