use crate::types::{Candidate, FailureReason, HostKind, ProbeOutcome};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{self, TcpStream};
use tokio::time::{self, Instant};

/// Measure best-of-N TCP connect latency to `candidate:port`.
///
/// - Domain names are resolved once, before the trials, within `timeout`.
///   A lookup that fails reports `Resolution`; one that runs out of time
///   reports `Timeout`.
/// - Runs `attempts` independent trials (at least one), each bounded by `timeout`.
/// - The reported latency is the minimum over successful trials.
/// - Sockets are closed as soon as the handshake completes; no data is exchanged.
/// - When every trial fails, the reason of the last failure is reported.
pub async fn probe(
    candidate: &Candidate,
    port: u16,
    timeout: Duration,
    attempts: u32,
) -> ProbeOutcome {
    let addrs = match resolve(candidate, port, timeout).await {
        Ok(addrs) => addrs,
        Err(reason) => return ProbeOutcome::Unreachable { reason },
    };

    let mut best: Option<Duration> = None;
    let mut last_failure = FailureReason::Network;

    for _ in 0..attempts.max(1) {
        let start = Instant::now();
        match time::timeout(timeout, connect_any(&addrs)).await {
            Ok(Ok(stream)) => {
                let latency = start.elapsed();
                drop(stream);
                best = Some(best.map_or(latency, |b| b.min(latency)));
            }
            Ok(Err(reason)) => last_failure = reason,
            Err(_elapsed) => last_failure = FailureReason::Timeout,
        }
    }

    match best {
        Some(latency) => ProbeOutcome::Reachable { latency },
        None => ProbeOutcome::Unreachable {
            reason: last_failure,
        },
    }
}

/// Socket addresses for `candidate:port`.
///
/// IP literals are used as-is. Names go through `tokio::net::lookup_host`,
/// which runs the system resolver on tokio's blocking pool: when `timeout`
/// fires the lookup is abandoned, but its pool thread stays busy until the
/// resolver returns.
async fn resolve(
    candidate: &Candidate,
    port: u16,
    timeout: Duration,
) -> Result<Vec<SocketAddr>, FailureReason> {
    let host = match candidate.kind {
        HostKind::Ip(ip) => return Ok(vec![SocketAddr::new(ip, port)]),
        HostKind::Domain => candidate.host.as_str(),
    };
    let addrs: Vec<SocketAddr> = time::timeout(timeout, net::lookup_host((host, port)))
        .await
        .map_err(|_| FailureReason::Timeout)?
        .map_err(|_| FailureReason::Resolution)?
        .collect();
    if addrs.is_empty() {
        return Err(FailureReason::Resolution);
    }
    Ok(addrs)
}

async fn connect_any(addrs: &[SocketAddr]) -> Result<TcpStream, FailureReason> {
    let mut last = FailureReason::Network;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last = classify(&e),
        }
    }
    Err(last)
}

fn classify(err: &io::Error) -> FailureReason {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => FailureReason::Refused,
        io::ErrorKind::TimedOut => FailureReason::Timeout,
        _ => FailureReason::Network,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::normalize;
    use tokio::net::{TcpListener, TcpSocket};

    /// A listener whose accept queue is full: further handshakes get no reply.
    async fn saturated_listener() -> (TcpListener, Vec<TcpStream>, u16) {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut held = Vec::new();
        for _ in 0..16 {
            match time::timeout(Duration::from_millis(100), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => held.push(stream),
                _ => break,
            }
        }
        (listener, held, addr.port())
    }

    #[tokio::test]
    async fn open_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let c = normalize(["127.0.0.1"]).remove(0);

        let outcome = probe(&c, port, Duration::from_secs(1), 2).await;
        assert!(outcome.is_reachable(), "{outcome:?}");
        assert!(outcome.latency().unwrap() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn closed_port_is_refused() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let c = normalize(["127.0.0.1"]).remove(0);

        let outcome = probe(&c, port, Duration::from_secs(1), 1).await;
        assert_eq!(
            outcome,
            ProbeOutcome::Unreachable {
                reason: FailureReason::Refused
            }
        );
    }

    #[tokio::test]
    async fn zero_attempts_still_probes_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let c = normalize(["127.0.0.1"]).remove(0);

        assert!(probe(&c, port, Duration::from_secs(1), 0).await.is_reachable());
    }

    #[tokio::test]
    async fn silent_listener_times_out() {
        let (_listener, _held, port) = saturated_listener().await;
        let c = normalize(["127.0.0.1"]).remove(0);
        let timeout = Duration::from_millis(200);

        let started = std::time::Instant::now();
        let outcome = probe(&c, port, timeout, 2).await;
        let elapsed = started.elapsed();

        assert_eq!(
            outcome,
            ProbeOutcome::Unreachable {
                reason: FailureReason::Timeout
            }
        );
        assert!(elapsed >= timeout * 2, "{elapsed:?}");
        assert!(elapsed < timeout * 2 + Duration::from_millis(500), "{elapsed:?}");
    }

    #[tokio::test]
    async fn ip_literal_needs_no_lookup() {
        let c = normalize(["::1"]).remove(0);
        let addrs = resolve(&c, 443, Duration::ZERO).await.unwrap();
        assert_eq!(addrs, vec!["[::1]:443".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn localhost_resolves_to_loopback() {
        let c = normalize(["localhost"]).remove(0);
        let addrs = resolve(&c, 8443, Duration::from_secs(2)).await.unwrap();
        assert!(!addrs.is_empty());
        assert!(addrs.iter().all(|a| a.ip().is_loopback() && a.port() == 8443));
    }

    #[test]
    fn classify_io_errors() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify(&refused), FailureReason::Refused);
        let other = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(classify(&other), FailureReason::Network);
    }
}
