//! # Stepwise
//!
//! Resumable call chains for cooperative polling loops.
//!
//! Firmware that must never block still needs multi-step operations: power a
//! radio, wait for it to warm up, transmit, listen for a reply, give up after
//! a timeout. Stepwise lets such an operation be written as a set of ordinary
//! nested functions that are re-entered from the top on every tick. Each one
//! asks the [`Engine`] where it left off, does a bit of work, and either
//! suspends (optionally asking for a delay) or ends with success or failure.
//! Outcomes and delays travel up the chain automatically.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Frame chain, begin / suspend / end, propagation |
//! | [`step`] | Step codes and outcomes |
//! | [`slots`] | Per-frame scratch values kept across ticks |
//! | [`clock`] | Millisecond time source (system or manual) |
//! | [`observe`] | Frame lifecycle events |
//! | [`driver`] | Top-level polling loop |
//! | [`message`] | 12-byte uplink payload codec |
//! | [`radio`] | Transceiver trait and simulator |
//! | [`protocol`] | The uplink operation |
//! | [`config`] | JSON-loadable settings |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepwise_core::prelude::*;
//!
//! let mut message = Message::new();
//! message.add_number("tmp", 21.5)?;
//!
//! let radio = SimulatedTransceiver::new(RadioConfig::default());
//! let mut ctx = UplinkContext::new(radio, &message, UplinkConfig::default())?;
//!
//! let mut driver = Driver::new(Engine::new(EngineConfig::default()), DriverConfig::default());
//! let summary = driver.run(|engine| uplink(engine, &mut ctx), None)?;
//! println!("{:?} after {} ticks", summary.outcome, summary.ticks);
//! ```
//!
//! ## Features
//!
//! - `sim` - [`radio::SimulatedTransceiver`] backed by `rand` (default)

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod frame;
pub mod message;
pub mod observe;
pub mod protocol;
pub mod radio;
pub mod slots;
pub mod step;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChildPolicy, EngineConfig, StepwiseConfig};
pub use driver::{Driver, DriverError, RunSummary, TickReport};
pub use engine::{Engine, FrameSnapshot};
pub use error::{EngineError, Result};
pub use message::{CodecError, Message};
pub use observe::{FrameEvent, FrameObserver, TracingObserver};
pub use radio::{RadioError, Transceiver};
pub use step::{Outcome, Step};

#[cfg(feature = "sim")]
pub use radio::SimulatedTransceiver;

/// Everything needed to write and drive resumable functions
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{
        ChildPolicy, DriverConfig, EngineConfig, RadioConfig, StepwiseConfig, UplinkConfig,
    };
    pub use crate::driver::{Driver, DriverError, RunSummary, TickReport};
    pub use crate::engine::Engine;
    pub use crate::error::{EngineError, Result};
    pub use crate::message::Message;
    pub use crate::protocol::{uplink, UplinkContext};
    pub use crate::radio::Transceiver;
    pub use crate::step::{Outcome, Step};

    #[cfg(feature = "sim")]
    pub use crate::radio::SimulatedTransceiver;
}
