//! Process-wide port allocation for embedded servers.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};

use tokio::net::TcpListener;

use crate::error::{Result, SpawnError};

/// First port handed out.
pub const FIRST_PORT: u16 = 18000;

static NEXT_PORT: AtomicU16 = AtomicU16::new(FIRST_PORT);

/// Next port that could be bound when tried. Concurrent callers never get
/// the same port; busy ports are skipped.
pub async fn next_port() -> Result<u16> {
    loop {
        let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
        if port < FIRST_PORT || port == u16::MAX {
            // Wrapped around: leave the counter pinned at the end.
            NEXT_PORT.store(u16::MAX, Ordering::Relaxed);
            return Err(SpawnError::PortsExhausted(FIRST_PORT));
        }

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        match TcpListener::bind(addr).await {
            Ok(_listener) => return Ok(port),
            Err(e) => tracing::debug!(port, error = %e, "port busy, skipping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ports_are_unique_and_increasing() {
        let a = next_port().await.unwrap();
        let b = next_port().await.unwrap();
        assert!(a >= FIRST_PORT);
        assert!(b > a);
    }

    #[tokio::test]
    async fn busy_port_skipped() {
        let handed_out = next_port().await.unwrap();
        // Occupy the port right after the one just handed out.
        let held = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, handed_out + 1))).await;

        let next = next_port().await.unwrap();
        if held.is_ok() {
            assert_ne!(next, handed_out + 1);
        }
        assert!(next > handed_out);
    }
}
