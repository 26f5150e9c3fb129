//! Liveness methods

use super::*;
use log::debug;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// TCP connect against the remote management port
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    port: u16,
    timeout: Duration,
}

impl TcpConnectProbe {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait::async_trait]
impl LivenessProbe for TcpConnectProbe {
    async fn probe(&self, address: Ipv4Addr) -> Reachability {
        let target = SocketAddr::new(IpAddr::V4(address), self.port);
        connect_within(target, self.timeout, TcpStream::connect(target)).await
    }

    fn method_name(&self) -> &str {
        "tcp-connect"
    }
}

/// Classify one connect attempt; errors and expiry both mean unreachable
async fn connect_within<F, S>(target: SocketAddr, limit: Duration, connect: F) -> Reachability
where
    F: Future<Output = io::Result<S>>,
{
    let start_time = Instant::now();

    match tokio::time::timeout(limit, connect).await {
        Ok(Ok(_stream)) => {
            debug!("{} reachable in {:?}", target, start_time.elapsed());
            Reachability::Reachable
        }
        Ok(Err(e)) => {
            debug!("{} unreachable: {}", target, e);
            Reachability::Unreachable
        }
        Err(_) => {
            debug!("{} timed out after {:?}", target, limit);
            Reachability::Unreachable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_listening_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpConnectProbe::new(port, Duration::from_millis(500));
        assert_eq!(probe.probe(Ipv4Addr::LOCALHOST).await, Reachability::Reachable);
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        // Bind then drop to obtain a port nothing is listening on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let probe = TcpConnectProbe::new(port, Duration::from_millis(500));
        assert_eq!(probe.probe(Ipv4Addr::LOCALHOST).await, Reachability::Unreachable);
    }

    #[tokio::test]
    async fn test_unanswered_connect_times_out() {
        let target = SocketAddr::from((Ipv4Addr::new(10, 0, 0, 1), 5985));
        let start_time = Instant::now();

        let reachability =
            connect_within(target, Duration::from_millis(50), std::future::pending::<io::Result<TcpStream>>()).await;

        assert_eq!(reachability, Reachability::Unreachable);
        assert!(start_time.elapsed() >= Duration::from_millis(50));
    }
}
