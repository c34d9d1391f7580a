//! Robot command link
//!
//! Plaintext request/response over a connectionless socket. The socket is
//! bound once at start-up and owned by the mission controller.

use crate::error::TransportError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

/// Maximum size of a robot reply
const MAX_REPLY_BYTES: usize = 1024;

/// Sends one command and waits for the robot's reply
#[async_trait]
pub trait MissionTransport: Send + Sync {
    async fn exchange(&self, command: &str, timeout: Duration) -> Result<String, TransportError>;
}

/// UDP link to the robot
pub struct UdpTransport {
    socket: UdpSocket,
    robot_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind the local reply port and target the robot's command address
    pub async fn bind(local_addr: SocketAddr, robot_addr: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(local_addr).await?;
        debug!(
            local = %socket.local_addr()?,
            robot = %robot_addr,
            "Robot command link bound"
        );
        Ok(Self { socket, robot_addr })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn robot_addr(&self) -> SocketAddr {
        self.robot_addr
    }

    /// Discard replies that arrived after an earlier exchange timed out
    fn drain_stale(&self) -> usize {
        let mut buf = [0u8; MAX_REPLY_BYTES];
        let mut dropped = 0;
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, from)) => {
                    trace!(bytes = len, from = %from, "Dropped stale datagram");
                    dropped += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "Failed to drain robot command link");
                    break;
                }
            }
        }
        dropped
    }

    async fn recv_from_robot(&self) -> Result<String, TransportError> {
        let mut buf = [0u8; MAX_REPLY_BYTES];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            if from != self.robot_addr {
                trace!(from = %from, "Ignoring datagram from unexpected peer");
                continue;
            }
            return std::str::from_utf8(&buf[..len])
                .map(str::to_string)
                .map_err(|_| TransportError::InvalidEncoding);
        }
    }
}

#[async_trait]
impl MissionTransport for UdpTransport {
    async fn exchange(&self, command: &str, timeout: Duration) -> Result<String, TransportError> {
        self.drain_stale();
        self.socket.send_to(command.as_bytes(), self.robot_addr).await?;
        debug!(command, "Sent robot command");

        let reply = tokio::time::timeout(timeout, self.recv_from_robot())
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        debug!(command, reply = %reply.trim(), "Received robot reply");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fake_robot() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[tokio::test]
    async fn test_drain_discards_queued_replies() {
        let (robot, robot_addr) = fake_robot().await;
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), robot_addr)
            .await
            .unwrap();
        let local = transport.local_addr().unwrap();

        assert_eq!(transport.drain_stale(), 0);

        robot.send_to(b"ok", local).await.unwrap();
        robot.send_to(b"late", local).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(transport.drain_stale(), 2);
        assert_eq!(transport.drain_stale(), 0);
    }

    #[tokio::test]
    async fn test_exchange_round_trip() {
        let (robot, robot_addr) = fake_robot().await;
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), robot_addr)
            .await
            .unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, from) = robot.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], b"command");
            robot.send_to(b"ok", from).await.unwrap();
        });

        let reply = transport
            .exchange("command", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply, "ok");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_exchange_times_out() {
        let (_robot, robot_addr) = fake_robot().await;
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), robot_addr)
            .await
            .unwrap();

        let result = transport
            .exchange("takeoff", Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_replies_from_other_peers_are_ignored() {
        let (robot, robot_addr) = fake_robot().await;
        let (intruder, _) = fake_robot().await;
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), robot_addr)
            .await
            .unwrap();
        let local = transport.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, from) = robot.recv_from(&mut buf).await.unwrap();
            intruder.send_to(b"ok", local).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            robot.send_to(b"error", from).await.unwrap();
        });

        let reply = transport
            .exchange("land", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply, "error");
        responder.await.unwrap();
    }
}
