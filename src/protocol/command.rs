//! Commands queued for the engine's poll loop

use bytes::Bytes;
use std::net::SocketAddr;
use tokio::sync::oneshot;

use crate::sequence::SequenceMetadata;

use super::engine::{Delivery, HostNameInfo, Reply, StatusReport, SyncEngine, SysInfo};

/// A received control datagram
#[derive(Debug, Clone)]
pub struct Datagram {
    pub payload: Bytes,
    pub source: SocketAddr,
    pub delivery: Delivery,
}

/// Work for the engine, applied in arrival order between poll ticks
#[derive(Debug)]
pub enum EngineCommand {
    Datagram(Datagram),
    Status {
        advanced: bool,
        reply: oneshot::Sender<StatusReport>,
    },
    SysInfo {
        reply: oneshot::Sender<SysInfo>,
    },
    HostNameInfo {
        reply: oneshot::Sender<HostNameInfo>,
    },
    Metadata {
        name: String,
        reply: oneshot::Sender<Option<SequenceMetadata>>,
    },
}

impl EngineCommand {
    /// Apply to completion. Returns a datagram to send, if any.
    pub fn apply(self, engine: &mut SyncEngine, now: u64) -> Option<Reply> {
        match self {
            EngineCommand::Datagram(datagram) => engine.handle_datagram(
                &datagram.payload,
                datagram.source,
                datagram.delivery,
                now,
            ),
            EngineCommand::Status { advanced, reply } => {
                let _ = reply.send(engine.status(advanced, now));
                None
            }
            EngineCommand::SysInfo { reply } => {
                let _ = reply.send(engine.sys_info(now));
                None
            }
            EngineCommand::HostNameInfo { reply } => {
                let _ = reply.send(engine.host_name_info());
                None
            }
            EngineCommand::Metadata { name, reply } => {
                let _ = reply.send(engine.remote_sequence_metadata(&name));
                None
            }
        }
    }
}
