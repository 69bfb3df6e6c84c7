//! Bounded, cancellable fan-out of probes.
//!
//! Each pass spawns one task per job onto a [`JoinSet`], gated by a
//! [`Semaphore`] so no more than `max_concurrency` probes are in flight.
//! Results are keyed by address, so completion order never affects the
//! outcome. The first fatal [`ProbeError`] cancels the pass: no further
//! probes start, in-flight ones run to completion, and their results are
//! discarded.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lanscape_core::OpenPort;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{DiscoverError, Result};
use crate::ports::PortTable;
use crate::probe::{LivenessProbe, PortProbe, ProbeError};

/// Outcome of one spawned job. `None` means the job saw the cancellation
/// before its probe started.
type Joined<J, T> = std::result::Result<(J, Option<std::result::Result<T, ProbeError>>), JoinError>;

struct Collector<J, T> {
    completed: Vec<(J, T)>,
    fatal: Option<DiscoverError>,
    skipped: usize,
}

impl<J, T> Collector<J, T> {
    fn absorb(&mut self, joined: Joined<J, T>, cancel: &CancellationToken) {
        match joined {
            Ok((job, Some(Ok(value)))) => self.completed.push((job, value)),
            Ok((_, Some(Err(e)))) => {
                if self.fatal.is_none() {
                    self.fatal = Some(e.into());
                }
            }
            Ok((_, None)) => self.skipped += 1,
            Err(e) => {
                cancel.cancel();
                if self.fatal.is_none() {
                    self.fatal = Some(DiscoverError::TaskJoin(e.to_string()));
                }
            }
        }
    }
}

/// Run `probe` once per job with at most `max_concurrency` in flight.
///
/// `timeout` is a hard ceiling on each probe; a probe that overruns it
/// counts as a negative result, never as an error.
async fn run_bounded<J, T, I, F, Fut>(
    pass: &'static str,
    jobs: I,
    max_concurrency: usize,
    timeout: Duration,
    negative: T,
    probe: F,
) -> Result<Vec<(J, T)>>
where
    J: Copy + Send + 'static,
    T: Clone + Send + 'static,
    I: IntoIterator<Item = J>,
    F: Fn(J) -> Fut,
    Fut: Future<Output = std::result::Result<T, ProbeError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let cancel = CancellationToken::new();
    let mut tasks: JoinSet<(J, Option<std::result::Result<T, ProbeError>>)> = JoinSet::new();
    let mut collector = Collector {
        completed: Vec::new(),
        fatal: None,
        skipped: 0,
    };
    let mut spawned = 0usize;

    for job in jobs {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let fut = probe(job);
        let task_cancel = cancel.clone();
        let negative = negative.clone();
        tasks.spawn(async move {
            if task_cancel.is_cancelled() {
                return (job, None);
            }
            let outcome = match tokio::time::timeout(timeout, fut).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(negative),
            };
            if outcome.is_err() {
                task_cancel.cancel();
            }
            drop(permit);
            (job, Some(outcome))
        });
        spawned += 1;

        while let Some(joined) = tasks.try_join_next() {
            collector.absorb(joined, &cancel);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        collector.absorb(joined, &cancel);
    }

    match collector.fatal {
        Some(e) => {
            tracing::warn!(
                pass,
                spawned,
                completed = collector.completed.len(),
                skipped = collector.skipped,
                error = %e,
                "Probe pass aborted"
            );
            Err(e)
        }
        None => Ok(collector.completed),
    }
}

/// Probe every address for liveness. The map has one entry per distinct
/// input address: `true` if it answered.
pub async fn run_liveness_pass(
    addresses: &[Ipv4Addr],
    probe: Arc<dyn LivenessProbe>,
    timeout: Duration,
    max_concurrency: usize,
) -> Result<BTreeMap<Ipv4Addr, bool>> {
    let start = Instant::now();
    let targets: BTreeSet<Ipv4Addr> = addresses.iter().copied().collect();
    let name = probe.name();

    tracing::debug!(
        probe = name,
        addresses = targets.len(),
        max_concurrency,
        timeout_ms = timeout.as_millis() as u64,
        "Starting liveness pass"
    );

    let outcomes = run_bounded("liveness", targets, max_concurrency, timeout, false, move |addr| {
        let probe = Arc::clone(&probe);
        async move { probe.check_live(addr, timeout).await }
    })
    .await?;

    let results: BTreeMap<Ipv4Addr, bool> = outcomes.into_iter().collect();
    for (addr, _) in results.iter().filter(|(_, up)| **up) {
        tracing::debug!(address = %addr, "Host is up");
    }
    tracing::info!(
        probe = name,
        addresses = results.len(),
        up = results.values().filter(|up| **up).count(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Liveness pass complete"
    );
    Ok(results)
}

/// Probe every port in `table` on every live address. Every distinct live
/// address gets an entry, empty if no port accepted a connection.
pub async fn run_port_pass(
    live: &[Ipv4Addr],
    table: &PortTable,
    probe: Arc<dyn PortProbe>,
    timeout: Duration,
    max_concurrency: usize,
) -> Result<BTreeMap<Ipv4Addr, BTreeSet<OpenPort>>> {
    let start = Instant::now();
    let hosts: BTreeSet<Ipv4Addr> = live.iter().copied().collect();
    let ports: Vec<u16> = table.ports().collect();
    let jobs: Vec<(Ipv4Addr, u16)> = hosts
        .iter()
        .flat_map(|addr| ports.iter().map(move |port| (*addr, *port)))
        .collect();

    let outcomes = run_bounded("port", jobs, max_concurrency, timeout, false, move |(addr, port)| {
        let probe = Arc::clone(&probe);
        async move { probe.check_port(addr, port, timeout).await }
    })
    .await?;

    let mut results: BTreeMap<Ipv4Addr, BTreeSet<OpenPort>> =
        hosts.iter().map(|addr| (*addr, BTreeSet::new())).collect();
    for ((addr, port), open) in outcomes {
        if open {
            let open_port = table.open_port(port);
            tracing::debug!(address = %addr, port, service = %open_port.service_name, "Open port");
            results.entry(addr).or_default().insert(open_port);
        }
    }

    tracing::info!(
        hosts = results.len(),
        ports_per_host = table.len(),
        open = results.values().map(BTreeSet::len).sum::<usize>(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Port pass complete"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    fn addrs(n: u8) -> Vec<Ipv4Addr> {
        (1..=n).map(|i| Ipv4Addr::new(10, 9, 0, i)).collect()
    }

    /// Answers from a fixed set after a per-address delay.
    struct Scripted {
        up: HashSet<Ipv4Addr>,
        delays: HashMap<Ipv4Addr, Duration>,
    }

    #[async_trait]
    impl LivenessProbe for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn check_live(&self, addr: Ipv4Addr, _: Duration) -> std::result::Result<bool, ProbeError> {
            if let Some(delay) = self.delays.get(&addr) {
                tokio::time::sleep(*delay).await;
            }
            Ok(self.up.contains(&addr))
        }
    }

    /// Tracks how many probes run at once.
    #[derive(Default)]
    struct Gauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LivenessProbe for Gauge {
        fn name(&self) -> &'static str {
            "gauge"
        }

        async fn check_live(&self, _: Ipv4Addr, _: Duration) -> std::result::Result<bool, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    /// Fails on one address and records every address it was asked about.
    struct FailsOn {
        bad: Ipv4Addr,
        error: ProbeError,
        seen: Mutex<Vec<Ipv4Addr>>,
    }

    #[async_trait]
    impl LivenessProbe for FailsOn {
        fn name(&self) -> &'static str {
            "fails-on"
        }

        async fn check_live(&self, addr: Ipv4Addr, _: Duration) -> std::result::Result<bool, ProbeError> {
            self.seen.lock().unwrap().push(addr);
            if addr == self.bad {
                return Err(self.error.clone());
            }
            Ok(true)
        }
    }

    struct Hangs;

    #[async_trait]
    impl LivenessProbe for Hangs {
        fn name(&self) -> &'static str {
            "hangs"
        }

        async fn check_live(&self, _: Ipv4Addr, _: Duration) -> std::result::Result<bool, ProbeError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        }
    }

    /// Ports listed in `open` accept connections on every host.
    struct OpenPorts {
        open: Vec<u16>,
        fail_on: Option<u16>,
    }

    #[async_trait]
    impl PortProbe for OpenPorts {
        async fn check_port(
            &self,
            _: Ipv4Addr,
            port: u16,
            _: Duration,
        ) -> std::result::Result<bool, ProbeError> {
            if self.fail_on == Some(port) {
                return Err(ProbeError::ResourceExhausted("EMFILE".into()));
            }
            Ok(self.open.contains(&port))
        }
    }

    #[tokio::test]
    async fn results_do_not_depend_on_completion_order() {
        let targets = addrs(12);
        let up: HashSet<Ipv4Addr> = targets.iter().step_by(3).copied().collect();

        let mut previous: Option<BTreeMap<Ipv4Addr, bool>> = None;
        for (round, concurrency) in [(0u64, 1usize), (1, 4), (2, 12)] {
            let delays = targets
                .iter()
                .enumerate()
                .map(|(i, a)| (*a, Duration::from_millis((i as u64 * 7 + round * 5) % 13)))
                .collect();
            let probe = Arc::new(Scripted { up: up.clone(), delays });

            let result = run_liveness_pass(&targets, probe, Duration::from_secs(1), concurrency)
                .await
                .unwrap();

            assert_eq!(result.len(), targets.len());
            assert_eq!(
                result.iter().filter(|(_, v)| **v).map(|(a, _)| *a).collect::<HashSet<_>>(),
                up
            );
            if let Some(prev) = &previous {
                assert_eq!(prev, &result);
            }
            previous = Some(result);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_the_limit() {
        let gauge = Arc::new(Gauge::default());
        let result = run_liveness_pass(&addrs(40), gauge.clone(), Duration::from_secs(1), 3)
            .await
            .unwrap();

        assert_eq!(result.len(), 40);
        assert_eq!(gauge.calls.load(Ordering::SeqCst), 40);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn duplicate_addresses_are_probed_once() {
        let gauge = Arc::new(Gauge::default());
        let mut targets = addrs(5);
        targets.extend(addrs(5));

        let result = run_liveness_pass(&targets, gauge.clone(), Duration::from_secs(1), 2)
            .await
            .unwrap();
        assert_eq!(result.len(), 5);
        assert_eq!(gauge.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn fatal_error_stops_new_probes() {
        let targets = addrs(20);
        let probe = Arc::new(FailsOn {
            bad: targets[4],
            error: ProbeError::Unavailable("no ICMP socket".into()),
            seen: Mutex::new(Vec::new()),
        });

        let err = run_liveness_pass(&targets, probe.clone(), Duration::from_secs(1), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, DiscoverError::ProbeUnavailable(_)));
        let seen = probe.seen.lock().unwrap().clone();
        assert_eq!(seen, targets[..5].to_vec());
    }

    #[tokio::test]
    async fn overrunning_probes_count_as_down() {
        let start = Instant::now();
        let result = run_liveness_pass(&addrs(4), Arc::new(Hangs), Duration::from_millis(50), 4)
            .await
            .unwrap();

        assert_eq!(result.len(), 4);
        assert!(result.values().all(|up| !up));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn empty_input_yields_empty_result() {
        let result = run_liveness_pass(&[], Arc::new(Hangs), Duration::from_millis(10), 4)
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn port_pass_attaches_named_ports_to_every_live_host() {
        let live = addrs(3);
        let probe = Arc::new(OpenPorts {
            open: vec![22, 443],
            fail_on: None,
        });

        let result = run_port_pass(
            &live,
            &PortTable::well_known(),
            probe,
            Duration::from_secs(1),
            8,
        )
        .await
        .unwrap();

        assert_eq!(result.len(), 3);
        for addr in &live {
            let ports: Vec<_> = result[addr].iter().cloned().collect();
            assert_eq!(ports, vec![OpenPort::new(22, "SSH"), OpenPort::new(443, "HTTPS")]);
        }
    }

    #[tokio::test]
    async fn port_pass_keeps_hosts_with_no_open_ports() {
        let probe = Arc::new(OpenPorts {
            open: Vec::new(),
            fail_on: None,
        });
        let result = run_port_pass(&addrs(2), &PortTable::well_known(), probe, Duration::from_secs(1), 4)
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.values().all(BTreeSet::is_empty));
    }

    #[tokio::test]
    async fn port_pass_aborts_on_exhaustion() {
        let probe = Arc::new(OpenPorts {
            open: vec![80],
            fail_on: Some(3306),
        });
        let err = run_port_pass(&addrs(2), &PortTable::well_known(), probe, Duration::from_secs(1), 4)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoverError::ResourceExhausted(_)));
    }
}
