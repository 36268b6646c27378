//! Uplink protocol built on the engine
//!
//! One uplink is four nested resumable functions:
//!
//! ```text
//! uplink ─┬─ START  ─► power_up       (POWER ─► warm-up delay ─► done)
//!         ├─ SEND   ─► transmit       (SEND, retried with a delay)
//!         ├─ LISTEN ─► await_downlink (START ─► RECEIVE polls ─► TIMEOUT)
//!         └─ END    ─► radio off, success
//! ```
//!
//! Every function re-runs from the top on each tick; only its step and slots
//! survive. A failure in any child marks `uplink` failed on the same tick.

use crate::clock::Clock;
use crate::config::UplinkConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::message::{CodecResult, Message};
use crate::radio::Transceiver;
use crate::step::Step;
use std::time::Duration;

/// Step codes used by the uplink functions
pub mod steps {
    use crate::step::Step;

    /// Entry step
    pub const START: Step = Step::new(1);
    /// Waiting for the downlink window
    pub const LISTEN: Step = Step::new(2);
    /// Transmitting
    pub const SEND: Step = Step::new(3);
    /// Polling for a downlink
    pub const RECEIVE: Step = Step::new(4);
    /// Powering the radio
    pub const POWER: Step = Step::new(5);
    /// Downlink window expired
    pub const TIMEOUT: Step = Step::new(6);
    /// Wrapping up
    pub const END: Step = Step::new(7);
}

use steps::*;

/// Frame name of the root operation
pub const UPLINK: &str = "uplink";
/// Frame name of the radio warm-up
pub const POWER_UP: &str = "power_up";
/// Frame name of the transmit step
pub const TRANSMIT: &str = "transmit";
/// Frame name of the downlink wait
pub const AWAIT_DOWNLINK: &str = "await_downlink";

/// Everything the uplink functions share besides the engine
#[derive(Debug)]
pub struct UplinkContext<T: Transceiver> {
    /// Radio used by the leaf functions
    pub radio: T,
    /// Encoded payload
    pub frame: Vec<u8>,
    /// Timing
    pub config: UplinkConfig,
    /// Downlink received, if any
    pub downlink: Option<Vec<u8>>,
}

impl<T: Transceiver> UplinkContext<T> {
    /// Prepare an uplink of `message`
    pub fn new(radio: T, message: &Message, config: UplinkConfig) -> CodecResult<Self> {
        Ok(Self {
            radio,
            frame: message.frame()?,
            config,
            downlink: None,
        })
    }

    /// Downlink as text
    pub fn downlink_text(&self) -> Option<String> {
        self.downlink
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Root operation: power up, send, wait for the downlink, power down
///
/// Call once per tick. Returns `false` once the uplink has failed.
pub fn uplink<C: Clock, T: Transceiver>(
    engine: &mut Engine<C>,
    ctx: &mut UplinkContext<T>,
) -> Result<bool> {
    match engine.begin(UPLINK, START)? {
        START => {
            power_up(engine, ctx)?;
            engine.suspend(SEND)
        }
        SEND => {
            transmit(engine, ctx)?;
            engine.suspend(LISTEN)
        }
        LISTEN => {
            await_downlink(engine, ctx)?;
            engine.suspend(END)
        }
        END => {
            ctx.radio.power_off();
            engine.end(true)
        }
        done if done.is_terminal() => Ok(done == Step::SUCCESS),
        other => {
            ctx.radio.echo(&format!("uplink: unknown step {}", other));
            engine.end(false)
        }
    }
}

/// Turn the radio on and wait for it to warm up
pub fn power_up<C: Clock, T: Transceiver>(
    engine: &mut Engine<C>,
    ctx: &mut UplinkContext<T>,
) -> Result<bool> {
    match engine.begin(POWER_UP, POWER)? {
        POWER => {
            if let Err(e) = ctx.radio.power_on() {
                ctx.radio.echo(&format!("power on failed: {}", e));
                return engine.end(false);
            }
            engine.suspend_for(END, Duration::from_millis(ctx.config.warmup_ms))
        }
        END => engine.end(true),
        _ => engine.end(false),
    }
}

/// Send the frame, retrying after a delay
///
/// The attempt count lives in the `byte` slot.
pub fn transmit<C: Clock, T: Transceiver>(
    engine: &mut Engine<C>,
    ctx: &mut UplinkContext<T>,
) -> Result<bool> {
    match engine.begin(TRANSMIT, SEND)? {
        SEND => {
            let attempts = engine.load::<u8>()?.saturating_add(1);
            engine.store(attempts)?;

            match ctx.radio.send(&ctx.frame) {
                Ok(()) => {
                    ctx.radio.echo(&format!(
                        "sent {} bytes (attempt {})",
                        ctx.frame.len(),
                        attempts
                    ));
                    engine.end(true)
                }
                Err(e) if attempts < ctx.config.max_send_attempts => {
                    ctx.radio.echo(&format!("send attempt {} failed: {}", attempts, e));
                    engine.suspend_same_for(Duration::from_millis(ctx.config.poll_interval_ms))
                }
                Err(e) => {
                    ctx.radio.echo(&format!("giving up after {} attempts: {}", attempts, e));
                    engine.end(false)
                }
            }
        }
        _ => engine.end(false),
    }
}

/// Poll for a downlink until it arrives or the window closes
///
/// The window start is kept in the `millis` slot, the downlink text in the
/// `text` slot.
pub fn await_downlink<C: Clock, T: Transceiver>(
    engine: &mut Engine<C>,
    ctx: &mut UplinkContext<T>,
) -> Result<bool> {
    match engine.begin(AWAIT_DOWNLINK, START)? {
        START => {
            let now = engine.clock().now_ms();
            engine.store(now)?;
            engine.suspend(RECEIVE)
        }
        RECEIVE => {
            if let Some(bytes) = ctx.radio.receive() {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                ctx.radio.echo(&format!("downlink: {}", text));
                engine.store(text)?;
                ctx.downlink = Some(bytes);
                return engine.end(true);
            }
            let started = engine.load::<u64>()?;
            if engine.clock().elapsed_since(started) >= ctx.config.downlink_timeout_ms {
                return engine.suspend(TIMEOUT);
            }
            engine.suspend_same_for(Duration::from_millis(ctx.config.poll_interval_ms))
        }
        TIMEOUT => {
            let required = ctx.config.downlink_required;
            ctx.radio.echo(if required {
                "downlink timeout"
            } else {
                "no downlink, continuing"
            });
            engine.end(!required)
        }
        _ => engine.end(false),
    }
}
