//! Sync protocol engine
//!
//! Decodes control datagrams and drives the player. All methods run to
//! completion on the caller's thread; the daemon calls them only from its
//! poll loop, so datagram handling never interleaves with a poll tick.

use bytes::Bytes;
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use crate::config::{AppConfig, DeviceConfig};
use crate::constants::{PLATFORM_NAME, REMOTE_PLAY_SENTINEL};
use crate::error::SequenceError;
use crate::playback::{AutoplayFallbackController, PollOutcome, SequencePlayer};
use crate::sequence::{SequenceFile, SequenceMetadata};
use crate::storage::SequenceStore;

use super::packet::{
    MultiSyncPacket, OperatingMode, Packet, PingDescriptor, SyncAction, PING_SUBTYPE_ANNOUNCE,
    SYNC_TYPE_SEQUENCE,
};

/// How a datagram reached the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Addressed to this device alone
    Unicast,
    /// Broadcast or multicast
    Broadcast,
}

/// A datagram the engine wants sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub payload: Bytes,
    pub destination: SocketAddr,
}

/// `getFPPstatus` document
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub fppd: &'static str,
    pub status: u8,
    pub status_name: &'static str,
    pub mode: u8,
    pub mode_name: &'static str,
    pub current_sequence: String,
    pub sequence_filename: String,
    pub seconds_elapsed: u64,
    pub seconds_played: u64,
    pub seconds_remaining: u64,
    pub time_elapsed: String,
    pub time_remaining: String,
    #[serde(rename = "advancedView", skip_serializing_if = "Option::is_none")]
    pub advanced_view: Option<SysInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Utilization {
    #[serde(rename = "Uptime")]
    pub uptime_ms: u64,
}

/// `getSysInfo` document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SysInfo {
    pub host_name: String,
    pub host_description: String,
    pub platform: &'static str,
    pub variant: String,
    pub mode: &'static str,
    pub version: String,
    #[serde(rename = "majorVersion")]
    pub major_version: u16,
    #[serde(rename = "minorVersion")]
    pub minor_version: u16,
    #[serde(rename = "typeId")]
    pub type_id: u8,
    pub utilization: Utilization,
    #[serde(rename = "IPS")]
    pub ips: Vec<String>,
}

/// `getHostNameInfo` document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostNameInfo {
    pub host_name: String,
    pub host_description: String,
}

/// Formats seconds as `mm:ss`
fn clock_text(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Owns the player and the autoplay fallback and applies leader commands
/// to them
pub struct SyncEngine {
    device: DeviceConfig,
    player: SequencePlayer,
    autoplay: AutoplayFallbackController,
    enabled: bool,
    local_ip: Ipv4Addr,
    discovery_port: u16,
}

impl SyncEngine {
    pub fn new(config: &AppConfig, store: Arc<dyn SequenceStore>) -> Self {
        Self {
            device: config.device.clone(),
            player: SequencePlayer::new(store, config.playback.output_channels),
            autoplay: AutoplayFallbackController::new(config.playback.autoplay.clone()),
            enabled: config.network.sync_enabled,
            local_ip: config.network.local_address.unwrap_or(Ipv4Addr::UNSPECIFIED),
            discovery_port: config.network.discovery_port,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_local_ip(&mut self, ip: Ipv4Addr) {
        self.local_ip = ip;
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    /// Storage is present and the autoplay name hands control to a leader
    pub fn remote_play_allowed(&self) -> bool {
        self.player.store().is_available() && self.autoplay.file_name() == REMOTE_PLAY_SENTINEL
    }

    pub fn operating_mode(&self) -> OperatingMode {
        if self.remote_play_allowed() {
            OperatingMode::Remote
        } else {
            OperatingMode::Bridge
        }
    }

    /// Decode and act on one control datagram. Malformed datagrams are
    /// logged and dropped.
    pub fn handle_datagram(
        &mut self,
        data: &[u8],
        source: SocketAddr,
        delivery: Delivery,
        now: u64,
    ) -> Option<Reply> {
        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!("Dropping datagram from {}: {}", source, e);
                return None;
            }
        };

        match packet {
            Packet::Ping(request) if request.is_discover() => {
                tracing::debug!("Discovery ping from {} ({:?})", source, delivery);
                Some(self.ping_reply(source, delivery))
            }
            Packet::Ping(_) => None,
            Packet::MultiSync(sync) => {
                self.handle_multisync(&sync, now);
                None
            }
            Packet::Blank => {
                if self.remote_play_allowed() {
                    self.blank();
                }
                None
            }
        }
    }

    fn handle_multisync(&mut self, sync: &MultiSyncPacket, now: u64) {
        if sync.sync_type != SYNC_TYPE_SEQUENCE {
            tracing::trace!("Ignoring media sync for '{}'", sync.filename);
            return;
        }
        if !self.enabled || !self.remote_play_allowed() {
            tracing::trace!("Ignoring {:?}: remote play not allowed", sync.action);
            return;
        }
        self.process_sync(sync.action, &sync.filename, sync.frame, now);
    }

    /// Apply a MultiSync action. Callers are responsible for the capability gate.
    pub fn process_sync(&mut self, action: SyncAction, filename: &str, frame: u32, now: u64) {
        tracing::trace!("{:?} '{}' frame {}", action, filename, frame);

        match action {
            SyncAction::Start => {
                if self.player.playing_name() != Some(filename) {
                    self.process_sync(SyncAction::Stop, filename, frame, now);
                    self.process_sync(SyncAction::Open, filename, frame, now);
                }
            }
            SyncAction::Stop => self.player.stop(),
            SyncAction::Sync => {
                if self.player.playing_name() != Some(filename) {
                    self.process_sync(SyncAction::Start, filename, frame, now);
                }
                if self.player.is_playing() && self.player.sync(frame, now) {
                    tracing::debug!("Resynced '{}' to frame {}", filename, frame);
                }
            }
            SyncAction::Open => {
                self.player.stop();
                if let Err(e) = self.player.start(filename, frame, now) {
                    tracing::warn!("Leader asked for '{}': {}", filename, e);
                }
            }
        }
    }

    /// Zero the output; playback position and state are unchanged
    pub fn blank(&mut self) {
        self.player.blank();
    }

    /// One playback tick, followed by the autoplay fallback
    pub fn poll(&mut self, now: u64) -> PollOutcome {
        let remote_active = self.remote_play_allowed();
        let outcome = self.player.poll(now);
        self.autoplay.tick(&mut self.player, outcome, remote_active, now);
        outcome
    }

    /// Blank the output once no frame has been produced for `timeout_ms`.
    /// Returns whether it blanked.
    pub fn enforce_blank_timeout(&mut self, now: u64, timeout_ms: u64) -> bool {
        if !self.player.watchdog().expired(now, timeout_ms) {
            return false;
        }
        tracing::debug!("No new frames for {}ms, blanking output", timeout_ms);
        self.player.blank();
        self.player.watchdog_mut().clear();
        true
    }

    /// Switch the local autoplay file. Anything else playing is stopped.
    pub fn set_autoplay(&mut self, name: &str, now: u64) {
        if self.autoplay.set_file_name(name) && self.player.playing_name() != Some(name) {
            self.player.stop();
        }
        if self.autoplay.defers_to_remote() {
            tracing::info!("Autoplay off, deferring to remote leader");
            return;
        }
        if let Err(e) = self.player.start(name, 0, now) {
            tracing::warn!("Autoplay '{}' did not start: {}", name, e);
        }
    }

    pub fn autoplay(&self) -> &AutoplayFallbackController {
        &self.autoplay
    }

    fn ping_descriptor(&self, subtype: u8) -> PingDescriptor {
        let (version_major, version_minor) = self.device.version_numbers();
        PingDescriptor {
            subtype,
            hardware_type: self.device.hardware_type,
            version_major,
            version_minor,
            mode: self.operating_mode(),
            ip: self.local_ip,
            hostname: self.device.hostname.clone(),
            version: self.device.full_version(),
            hardware_variant: self.device.variant.clone(),
        }
    }

    fn broadcast_destination(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, self.discovery_port))
    }

    fn ping_reply(&self, source: SocketAddr, delivery: Delivery) -> Reply {
        let destination = match delivery {
            Delivery::Unicast => SocketAddr::new(source.ip(), self.discovery_port),
            Delivery::Broadcast => self.broadcast_destination(),
        };
        Reply {
            payload: self.ping_descriptor(PING_SUBTYPE_ANNOUNCE).encode(),
            destination,
        }
    }

    /// Unsolicited broadcast announcing this device
    pub fn announcement(&self) -> Reply {
        Reply {
            payload: self.ping_descriptor(PING_SUBTYPE_ANNOUNCE).encode(),
            destination: self.broadcast_destination(),
        }
    }

    pub fn status(&self, advanced: bool, now: u64) -> StatusReport {
        let mode = self.operating_mode();
        let (name, elapsed, total) = match self.player.session() {
            Some(s) => (s.name().to_string(), s.elapsed_ms() / 1000, s.duration_ms() / 1000),
            None => (String::new(), 0, 0),
        };
        let remaining = total.saturating_sub(elapsed);
        let playing = self.player.is_playing();

        StatusReport {
            fppd: "running",
            status: u8::from(playing),
            status_name: if playing { "playing" } else { "idle" },
            mode: mode.code(),
            mode_name: mode.name(),
            current_sequence: name.clone(),
            sequence_filename: name,
            seconds_elapsed: elapsed,
            seconds_played: elapsed,
            seconds_remaining: remaining,
            time_elapsed: clock_text(elapsed),
            time_remaining: clock_text(remaining),
            advanced_view: advanced.then(|| self.sys_info(now)),
        }
    }

    pub fn sys_info(&self, now: u64) -> SysInfo {
        let (major_version, minor_version) = self.device.version_numbers();
        SysInfo {
            host_name: self.device.hostname.clone(),
            host_description: self.device.description.clone(),
            platform: PLATFORM_NAME,
            variant: self.device.variant.clone(),
            mode: self.operating_mode().name(),
            version: self.device.full_version(),
            major_version,
            minor_version,
            type_id: self.device.hardware_type,
            utilization: Utilization { uptime_ms: now },
            ips: vec![self.local_ip.to_string()],
        }
    }

    pub fn host_name_info(&self) -> HostNameInfo {
        HostNameInfo {
            host_name: self.device.hostname.clone(),
            host_description: self.device.description.clone(),
        }
    }

    /// Read a sequence's metadata with a handle of its own. Playback is not
    /// touched.
    pub fn sequence_metadata(&self, name: &str) -> Result<SequenceMetadata, SequenceError> {
        let mut file = SequenceFile::open(self.player.store().as_ref(), name)?;
        let metadata = file.read_metadata();
        file.close();
        metadata
    }

    /// Metadata for a leader; only served while remote play is allowed
    pub fn remote_sequence_metadata(&self, name: &str) -> Option<SequenceMetadata> {
        if !self.remote_play_allowed() {
            return None;
        }
        match self.sequence_metadata(name) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::warn!("Metadata query for '{}' failed: {}", name, e);
                None
            }
        }
    }

    pub fn player(&self) -> &SequencePlayer {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut SequencePlayer {
        &mut self.player
    }

    /// Channel data for the renderer
    pub fn output(&self) -> &[u8] {
        self.player.output().as_slice()
    }
}
