//! Liveness via the system `ping` binary.
//!
//! Slower than [`super::IcmpProbe`] (one process per address) but needs no
//! socket privileges of its own.

use std::io;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{is_resource_exhaustion, LivenessProbe, ProbeError};

pub struct PingCommandProbe {
    program: String,
}

impl PingCommandProbe {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

/// Arguments for a single echo request bounded by `timeout`.
fn ping_args(addr: Ipv4Addr, timeout: Duration) -> Vec<String> {
    let target = addr.to_string();

    if cfg!(windows) {
        let ms = timeout.as_millis().max(1);
        vec!["-n".into(), "1".into(), "-w".into(), ms.to_string(), target]
    } else if cfg!(target_os = "macos") {
        // BSD ping takes -W in milliseconds.
        let ms = timeout.as_millis().max(1);
        vec!["-c".into(), "1".into(), "-W".into(), ms.to_string(), target]
    } else {
        // iputils takes -W in whole seconds.
        let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        vec!["-c".into(), "1".into(), "-W".into(), secs.to_string(), target]
    }
}

fn spawn_error(program: &str, e: &io::Error) -> ProbeError {
    // fork() reports a full process table as EAGAIN.
    if is_resource_exhaustion(e) || e.kind() == io::ErrorKind::WouldBlock {
        ProbeError::ResourceExhausted(format!("spawning {program}: {e}"))
    } else {
        ProbeError::Unavailable(format!("cannot run {program}: {e}"))
    }
}

#[async_trait]
impl LivenessProbe for PingCommandProbe {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn check_live(&self, addr: Ipv4Addr, timeout: Duration) -> Result<bool, ProbeError> {
        let mut child = Command::new(&self.program)
            .args(ping_args(addr, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.program, &e))?;

        // The child is killed on drop if ping overruns its own deadline.
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => Ok(status.success()),
            Ok(Err(e)) => {
                tracing::debug!(address = %addr, error = %e, "Waiting on ping failed");
                Ok(false)
            }
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_send_a_single_request() {
        let args = ping_args(Ipv4Addr::new(10, 0, 0, 1), Duration::from_millis(1500));
        assert_eq!(args.last().map(String::as_str), Some("10.0.0.1"));
        assert!(args.iter().any(|a| a == "1"));
        if cfg!(target_os = "linux") {
            assert_eq!(args, vec!["-c", "1", "-W", "2", "10.0.0.1"]);
        }
    }

    #[test]
    fn sub_second_timeouts_round_up_on_linux() {
        let args = ping_args(Ipv4Addr::new(10, 0, 0, 1), Duration::from_millis(200));
        if cfg!(target_os = "linux") {
            assert_eq!(args[3], "1");
        }
    }

    #[test]
    fn process_limit_is_resource_exhaustion() {
        let e = io::Error::from(io::ErrorKind::WouldBlock);
        assert!(matches!(spawn_error("ping", &e), ProbeError::ResourceExhausted(_)));

        #[cfg(target_os = "linux")]
        {
            let eagain = io::Error::from_raw_os_error(11);
            assert!(matches!(spawn_error("ping", &eagain), ProbeError::ResourceExhausted(_)));
        }

        let e = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(spawn_error("ping", &e), ProbeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let probe = PingCommandProbe::new("/nonexistent/lanscape-ping");
        let err = probe
            .check_live(Ipv4Addr::LOCALHOST, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_means_down() {
        // `false` ignores its arguments and exits 1.
        let probe = PingCommandProbe::new("false");
        let up = probe
            .check_live(Ipv4Addr::LOCALHOST, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(!up);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_means_up() {
        let probe = PingCommandProbe::new("true");
        let up = probe
            .check_live(Ipv4Addr::LOCALHOST, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(up);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_ping_is_down_at_the_deadline() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Instant;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-ping");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let probe = PingCommandProbe::new(script.to_str().unwrap());
        let start = Instant::now();
        let up = probe
            .check_live(Ipv4Addr::new(192, 0, 2, 1), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!up);
        assert!(start.elapsed() <= Duration::from_millis(1200));
    }
}
