//! Health monitor
//!
//! One probe task per checked service, ticking at the check's interval.
//! Bring-up phase: the retry budget is spent before the first success;
//! exhausting it without one is a stack-level bring-up failure. After the
//! first success, probing continues on the same interval and each result
//! independently toggles HEALTHY/UNHEALTHY — no flap damping, matching
//! the minimal manifest semantics. Probes for different services run
//! fully independently; the runner applies the per-probe timeout.

use crate::domain::{HealthCheck, ServiceSpec};
use crate::runtime::events::StackEvent;
use crate::runtime::runner::{ProbeOutcome, ServiceRunner};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Spawn the monitor for one service instance. Cancelled through the
/// watch channel when the instance stops, fails, or the stack tears down.
pub(crate) fn spawn_monitor(
    spec: ServiceSpec,
    check: HealthCheck,
    runner: Arc<dyn ServiceRunner>,
    tx: mpsc::UnboundedSender<StackEvent>,
    mut cancel: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(check.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; probes start one interval in
        ticks.tick().await;

        let mut remaining = check.retries;
        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    let outcome = runner.probe(&spec, &check).await;
                    if outcome == ProbeOutcome::Healthy {
                        let _ = tx.send(StackEvent::Probe {
                            service: spec.name.clone(),
                            healthy: true,
                        });
                        break;
                    }
                    remaining -= 1;
                    debug!(
                        "Probe failed for '{}' ({} of {} attempts left)",
                        spec.name, remaining, check.retries
                    );
                    if remaining == 0 {
                        let _ = tx.send(StackEvent::ProbeBudgetExhausted {
                            service: spec.name.clone(),
                        });
                        return;
                    }
                }
                _ = cancel.changed() => return,
            }
        }

        // Steady state: every result toggles, indefinitely
        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    let outcome = runner.probe(&spec, &check).await;
                    let _ = tx.send(StackEvent::Probe {
                        service: spec.name.clone(),
                        healthy: outcome == ProbeOutcome::Healthy,
                    });
                }
                _ = cancel.changed() => return,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{service_spec, FakeRunner, ServiceScript};
    use std::time::Duration;

    fn checked_spec(name: &str) -> (ServiceSpec, HealthCheck) {
        let check = HealthCheck {
            command: crate::domain::ProbeCommand::shell("true"),
            interval: Duration::from_secs(1),
            retries: 5,
            timeout: Duration::from_secs(30),
        };
        let mut spec = service_spec(name);
        spec.healthcheck = Some(check.clone());
        (spec, check)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_emitted_at_probe_tick() {
        let (spec, check) = checked_spec("db");
        let runner = Arc::new(
            FakeRunner::new().with_service(
                "db",
                ServiceScript::running().healthy_after(Duration::from_millis(2500)),
            ),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let started = tokio::time::Instant::now();
        spawn_monitor(spec, check, runner, tx, cancel_rx);

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            StackEvent::Probe {
                service: "db".to_string(),
                healthy: true,
            }
        );
        // Reachable at 2.5s, first success at the 3s tick, never earlier
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted_without_success() {
        let (spec, check) = checked_spec("db");
        let runner = Arc::new(
            FakeRunner::new().with_service("db", ServiceScript::running().never_healthy()),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let started = tokio::time::Instant::now();
        spawn_monitor(spec, check, runner, tx, cancel_rx);

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            StackEvent::ProbeBudgetExhausted {
                service: "db".to_string(),
            }
        );
        // retries=5, interval=1s: exhausted exactly at the fifth tick
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_state_toggles_after_first_success() {
        let (spec, check) = checked_spec("db");
        let runner = Arc::new(
            FakeRunner::new().with_service(
                "db",
                ServiceScript::running().healthy_after(Duration::ZERO),
            ),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        spawn_monitor(spec, check, runner, tx, cancel_rx);

        // First success, then continued probing on the same interval
        for _ in 0..3 {
            let event = rx.recv().await.unwrap();
            assert!(matches!(event, StackEvent::Probe { healthy: true, .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_probing() {
        let (spec, check) = checked_spec("db");
        let runner = Arc::new(
            FakeRunner::new().with_service("db", ServiceScript::running().never_healthy()),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task = spawn_monitor(spec, check, runner, tx, cancel_rx);
        cancel_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
