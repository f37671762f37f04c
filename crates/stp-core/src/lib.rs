//! Per-VLAN spanning tree protocol engine.
//!
//! One [`StpEngine`] value holds everything: the fixed-capacity instance
//! table, the interface table, the global guard/fast masks, the BPDU
//! templates and the drop counters. Its lifecycle is init -> run ->
//! shutdown; there are no ambient globals and no background threads. All
//! protocol progress is driven by [`StpEngine::tick`] every 100 ms; BPDU
//! ingress and configuration deltas are short run-to-completion calls
//! between ticks.
//!
//! The engine talks to the outside world through two seams: [`StateSync`]
//! (state publication) and [`BpduTransport`] (raw frame egress). Both have
//! recording in-memory implementations for tests.

mod bridge;
mod engine;
mod instance;
mod intf;
mod port;
mod protocol;
mod sync;
mod tick;
mod timer;
mod transport;

pub use bridge::BridgeData;
pub use engine::{EngineConfig, ProtoMode, StpEngine};
pub use instance::{InstanceState, StpInstance};
pub use intf::{PortTable, MAX_PORT_CHANNELS};
pub use port::StpPort;
pub use sync::{MemorySync, StateSync, SyncEvent, VlanPortTableUpdate, VlanTableUpdate};
pub use timer::Timer;
pub use transport::{BpduTransport, MockTransport, TxRecord};

/// Index of a per-VLAN instance in the engine's fixed-capacity table.
pub type StpIndex = u16;

/// Sentinel used on the wire for "no instance".
pub const STP_INDEX_INVALID: StpIndex = 0xffff;

/// Configuration failures reported back to the IPC sender. These never
/// mutate engine state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{what} {value} out of range [{min}, {max}]")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("unknown VLAN {0}")]
    UnknownVlan(u16),

    #[error("unknown interface {0}")]
    UnknownInterface(String),

    #[error("instance {0} out of range")]
    BadInstance(u16),

    #[error("instance {0} is not free")]
    InstanceInUse(u16),

    #[error("timer relation violated: 2*(fwd_delay-1) >= max_age >= 2*(hello+1)")]
    TimerRelation,

    #[error("no free {0} available")]
    ResourceExhausted(&'static str),
}

/// Protocol constants (defaults and bounds) shared by the engine and the
/// management adapter.
pub mod params {
    pub const DFLT_PRIORITY: u16 = 32768;
    pub const MIN_PRIORITY: u16 = 0;
    pub const MAX_PRIORITY: u16 = 65535;

    pub const DFLT_FORWARD_DELAY: u8 = 15;
    pub const MIN_FORWARD_DELAY: u8 = 4;
    pub const MAX_FORWARD_DELAY: u8 = 30;

    pub const DFLT_MAX_AGE: u8 = 20;
    pub const MIN_MAX_AGE: u8 = 6;
    pub const MAX_MAX_AGE: u8 = 40;

    pub const DFLT_HELLO_TIME: u8 = 2;
    pub const MIN_HELLO_TIME: u8 = 1;
    pub const MAX_HELLO_TIME: u8 = 10;

    pub const DFLT_HOLD_TIME: u8 = 1;

    pub const DFLT_ROOT_PROTECT_TIMEOUT: u16 = 30;
    pub const MIN_ROOT_PROTECT_TIMEOUT: u16 = 5;
    pub const MAX_ROOT_PROTECT_TIMEOUT: u16 = 600;

    pub const DFLT_PORT_PRIORITY: u8 = 128;
    pub const MAX_PORT_PRIORITY: u8 = 240;

    /// Shortened forward delay for operational PortFast ports.
    pub const FASTSPAN_FORWARD_DELAY: u8 = 2;

    /// Forward delay applied when UplinkFast conditions hold.
    pub const FASTUPLINK_FORWARD_DELAY: u8 = 1;

    /// Added to the received message age before retransmission.
    pub const MESSAGE_AGE_INCREMENT: u16 = 1;
}
