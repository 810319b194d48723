//! Socket-backed cross-process lock.
//!
//! Holding the lock means holding a listener bound on a fixed loopback port.
//! Exclusion therefore only reaches processes on the same host.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{CrossProcessLock, HeldResource, LockError, LockToken};
use crate::constants::defaults;

#[derive(Debug, Clone)]
pub struct SocketLock {
    address: SocketAddr,
    max_jitter: Duration,
}

impl SocketLock {
    pub fn new(port: u16) -> Self {
        Self {
            address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)),
            max_jitter: Duration::from_millis(defaults::LOCK_SOCKET_MAX_JITTER_MS),
        }
    }

    /// Upper bound of the random delay between bind attempts.
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    fn attempt(&self) -> Result<Option<TcpListener>, LockError> {
        match TcpListener::bind(self.address) {
            Ok(listener) => Ok(Some(listener)),
            Err(e) if e.kind() == ErrorKind::AddrInUse => Ok(None),
            Err(e) => Err(LockError::Io {
                resource: self.resource(),
                error: e.to_string(),
            }),
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(fastrand::u64(0..=max_ms))
    }
}

impl Default for SocketLock {
    fn default() -> Self {
        Self::new(defaults::LOCK_SOCKET_PORT)
    }
}

#[async_trait]
impl CrossProcessLock for SocketLock {
    async fn try_acquire(&self, timeout: Duration) -> Result<LockToken, LockError> {
        let started = Instant::now();

        loop {
            if let Some(listener) = self.attempt()? {
                debug!(resource = %self.resource(), "Lock acquired");
                return Ok(LockToken::new(
                    self.resource(),
                    HeldResource::Socket(listener),
                ));
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(LockError::Timeout {
                    resource: self.resource(),
                    waited_ms: elapsed.as_millis(),
                });
            }

            trace!(resource = %self.resource(), "Lock port in use, retrying");
            tokio::time::sleep(self.jitter().min(timeout - elapsed)).await;
        }
    }

    fn resource(&self) -> String {
        format!("socket {}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Port that was free a moment ago.
    fn free_port() -> u16 {
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    }

    fn lock() -> SocketLock {
        SocketLock::new(free_port()).with_max_jitter(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_bind_is_acquisition() {
        let lock = lock();
        let token = lock.try_acquire(Duration::from_millis(200)).await.unwrap();
        assert!(token.is_held());
        assert!(TcpListener::bind(lock.address()).is_err());

        token.release();
        assert!(TcpListener::bind(lock.address()).is_ok());
    }

    #[tokio::test]
    async fn test_second_holder_times_out() {
        let lock = lock();
        let _token = lock.try_acquire(Duration::from_millis(200)).await.unwrap();

        let second = lock.try_acquire(Duration::from_millis(100)).await;
        assert!(second.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_waiter_acquires_after_release() {
        let lock = lock();
        let token = lock.try_acquire(Duration::from_millis(200)).await.unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.try_acquire(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(token);

        assert!(waiter.await.unwrap().is_ok());
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let lock = SocketLock::default().with_max_jitter(Duration::from_millis(50));
        for _ in 0..100 {
            assert!(lock.jitter() <= Duration::from_millis(50));
        }
        assert_eq!(lock.address().port(), defaults::LOCK_SOCKET_PORT);
    }
}
