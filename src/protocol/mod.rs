//! Multi-device sync protocol
//!
//! Leaders send small UDP datagrams (MultiSync, Blank, Ping) to port 32320,
//! by unicast, broadcast, or the multicast group. This module decodes them
//! and applies them to the local player.

pub mod command;
pub mod engine;
pub mod packet;

pub use command::{Datagram, EngineCommand};
pub use engine::{Delivery, HostNameInfo, Reply, StatusReport, SyncEngine, SysInfo, Utilization};
pub use packet::{
    MultiSyncPacket, OperatingMode, Packet, PacketType, PingDescriptor, PingRequest, SyncAction,
};
