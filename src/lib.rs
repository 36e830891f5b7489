//! # PixelSync
//!
//! Frame-accurate sequence playback and multi-device sync for pixel
//! lighting controllers.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                              LEADER                                   │
//! │        MultiSync (start/stop/sync/open) · Blank · Ping · HTTP         │
//! └───────────────────────────────────┬───────────────────────────────────┘
//!                                     │ UDP 32320 (unicast / broadcast /
//!                                     │ multicast 239.70.80.80)
//! ┌───────────────────────────────────┼───────────────────────────────────┐
//! │                               DEVICE                                  │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐   │
//! │  │ Unicast receiver │   │  Group receiver  │   │  HTTP (axum) ui  │   │
//! │  │ (network::udp)   │   │ (network::udp)   │   │  status · meta   │   │
//! │  └────────┬─────────┘   └────────┬─────────┘   └────────┬─────────┘   │
//! │           └──────────────────────┼──────────────────────┘             │
//! │                                  ▼                                    │
//! │              ┌──────────────────────────────────────┐                 │
//! │              │   Engine inbox (crossbeam, bounded)  │                 │
//! │              └──────────────────┬───────────────────┘                 │
//! │                                 ▼  single poll loop                   │
//! │  ┌──────────────────────────────────────────────────────────────┐     │
//! │  │ SyncEngine (protocol::engine)                                │     │
//! │  │   ├── SequencePlayer (playback::player) ── PlaybackClock     │     │
//! │  │   │        └── SequenceFile (sequence::reader)               │     │
//! │  │   │                 └── SequenceStore (storage)              │     │
//! │  │   └── AutoplayFallbackController (playback::autoplay)        │     │
//! │  └──────────────────────────────┬───────────────────────────────┘     │
//! │                                 ▼                                     │
//! │                    OutputBuffer → pixel renderer                      │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod playback;
pub mod protocol;
pub mod sequence;
pub mod storage;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::net::Ipv4Addr;

    /// UDP port for sync, discovery and blank datagrams
    pub const DISCOVERY_PORT: u16 = 32320;

    /// Multicast group leaders send sync datagrams to
    pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 70, 80, 80);

    /// Autoplay name meaning "no local file, follow the leader"
    pub const REMOTE_PLAY_SENTINEL: &str = "...";

    /// Hardware type id reported in ping descriptors
    pub const DEFAULT_HARDWARE_TYPE: u8 = 0xC3;

    pub const DEFAULT_VARIANT_NAME: &str = "PixelSync Controller";

    pub const PLATFORM_NAME: &str = "PixelSync";

    /// 16 universes of 512 channels
    pub const DEFAULT_OUTPUT_CHANNELS: usize = 512 * 16;

    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5;

    pub const DEFAULT_HTTP_PORT: u16 = 8080;
}
