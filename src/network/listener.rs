//! Sync listener
//!
//! Waits until the device has a usable address, binds the unicast and group
//! sockets, and forwards every datagram into the engine inbox. Receive
//! tasks never touch engine state.

use bytes::Bytes;
use crossbeam_channel::{Sender, TrySendError};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::protocol::{Datagram, Delivery, EngineCommand, Reply};

use super::udp::{create_group_socket, create_unicast_socket};

/// Resolves once the watch carries an address. `None` if the sender is gone.
pub async fn wait_for_network(rx: &mut watch::Receiver<Option<Ipv4Addr>>) -> Option<Ipv4Addr> {
    loop {
        if let Some(ip) = *rx.borrow_and_update() {
            return Some(ip);
        }
        if rx.changed().await.is_err() {
            return None;
        }
    }
}

/// Sends engine replies from the unicast socket
#[derive(Clone)]
pub struct ReplySender {
    socket: Arc<UdpSocket>,
}

impl ReplySender {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }

    /// Non-blocking send; a full socket buffer drops the reply
    pub fn send(&self, reply: &Reply) -> Result<(), NetworkError> {
        self.socket
            .try_send_to(&reply.payload, reply.destination)
            .map(|_| ())
            .map_err(|e| NetworkError::SendFailed(format!("{}: {}", reply.destination, e)))
    }
}

/// Running receive tasks
pub struct SyncListener {
    local_ip: Ipv4Addr,
    replies: ReplySender,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncListener {
    /// Bind both sockets on `local_ip` and start forwarding into `inbox`.
    /// Must be called inside a tokio runtime.
    pub fn bind(
        config: &NetworkConfig,
        local_ip: Ipv4Addr,
        inbox: Sender<EngineCommand>,
    ) -> Result<Self, NetworkError> {
        let unicast = Arc::new(create_unicast_socket(
            local_ip,
            config.discovery_port,
            config.recv_buffer_size,
        )?);
        let group = Arc::new(create_group_socket(
            config.discovery_port,
            config.multicast_group,
            local_ip,
            config.recv_buffer_size,
        )?);

        tracing::info!(
            "Sync listener on {}:{} (group {})",
            local_ip,
            config.discovery_port,
            config.multicast_group
        );

        let tasks = vec![
            spawn_receiver(
                unicast.clone(),
                Delivery::Unicast,
                inbox.clone(),
                config.recv_buffer_size,
            ),
            spawn_receiver(group, Delivery::Broadcast, inbox, config.recv_buffer_size),
        ];

        Ok(Self {
            local_ip,
            replies: ReplySender::new(unicast),
            tasks,
        })
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    pub fn reply_sender(&self) -> ReplySender {
        self.replies.clone()
    }

    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Forward datagrams from `socket` until the inbox closes
pub fn spawn_receiver(
    socket: Arc<UdpSocket>,
    delivery: Delivery,
    inbox: Sender<EngineCommand>,
    buffer_size: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; buffer_size];

        loop {
            let (len, source) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    let err = NetworkError::ReceiveFailed(format!("{:?} socket: {}", delivery, e));
                    tracing::warn!("{}", err);
                    continue;
                }
            };

            let command = EngineCommand::Datagram(Datagram {
                payload: Bytes::copy_from_slice(&buf[..len]),
                source,
                delivery,
            });

            match inbox.try_send(command) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Engine inbox full, dropping datagram from {}", source);
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::debug!("Engine inbox closed, receiver exiting");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::encode_discover;
    use crossbeam_channel::bounded;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_for_network() {
        let (tx, mut rx) = watch::channel(None);
        let waiter = tokio::spawn(async move { wait_for_network(&mut rx).await });

        tx.send(Some(Ipv4Addr::new(10, 1, 2, 3))).unwrap();
        assert_eq!(waiter.await.unwrap(), Some(Ipv4Addr::new(10, 1, 2, 3)));

        let (tx, mut rx) = watch::channel::<Option<Ipv4Addr>>(None);
        drop(tx);
        assert_eq!(wait_for_network(&mut rx).await, None);
    }

    #[tokio::test]
    async fn test_receiver_forwards_datagrams() {
        let socket = Arc::new(create_unicast_socket(Ipv4Addr::LOCALHOST, 0, 2048).unwrap());
        let addr = socket.local_addr().unwrap();
        let (tx, rx) = bounded(4);
        let task = spawn_receiver(socket, Delivery::Unicast, tx, 2048);

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(&encode_discover(), addr).await.unwrap();

        let mut received = None;
        for _ in 0..100 {
            if let Ok(command) = rx.try_recv() {
                received = Some(command);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        match received {
            Some(EngineCommand::Datagram(datagram)) => {
                assert_eq!(datagram.payload, encode_discover());
                assert_eq!(datagram.delivery, Delivery::Unicast);
                assert_eq!(datagram.source, peer.local_addr().unwrap());
            }
            other => panic!("expected a datagram, got {:?}", other),
        }
        task.abort();
    }

    #[tokio::test]
    async fn test_reply_sender() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let sender = ReplySender::new(socket);
        sender
            .send(&Reply {
                payload: Bytes::from_static(b"FPPD\x03\x00\x00"),
                destination: target.local_addr().unwrap(),
            })
            .unwrap();

        let mut buf = [0u8; 16];
        let len = tokio::time::timeout(Duration::from_secs(2), target.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"FPPD\x03\x00\x00");
    }
}
