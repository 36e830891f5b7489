//! UDP transport for the sync protocol

pub mod listener;
pub mod udp;

pub use listener::{spawn_receiver, wait_for_network, ReplySender, SyncListener};
pub use udp::{create_group_socket, create_unicast_socket, detect_local_ipv4};
