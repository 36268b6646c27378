//! Top-level polling loop
//!
//! The driver owns the tick. On every tick it re-enters the root operation,
//! lets the nested chain run synchronously until it suspends or ends, then
//! reads back the outcome and the requested delay and sleeps accordingly.

use crate::clock::Clock;
use crate::config::DriverConfig;
use crate::engine::Engine;
use crate::error::{self, EngineError};
use crate::step::Outcome;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Driver errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The engine reported misuse or exhaustion
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The root did not finish within the tick budget
    #[error("no outcome after {ticks} ticks")]
    TickLimit {
        /// Ticks executed
        ticks: u64,
    },

    /// The stop flag was raised
    #[error("stopped after {ticks} ticks")]
    Stopped {
        /// Ticks executed
        ticks: u64,
    },

    /// A tick returned without unwinding to the root
    #[error("tick ended inside '{current}' instead of the root")]
    NotUnwound {
        /// Frame the engine was left on
        current: String,
    },
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Tick number, starting at 1
    pub tick: u64,
    /// Root outcome after the tick
    pub outcome: Outcome,
    /// Delay requested before the next tick
    pub delay: Duration,
}

/// Result of a complete run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Ticks executed
    pub ticks: u64,
    /// Final outcome (`Succeeded` or `Failed`)
    pub outcome: Outcome,
    /// Clock time spent, in milliseconds
    pub elapsed_ms: u64,
}

/// Polling loop around one engine
#[derive(Debug)]
pub struct Driver<C: Clock> {
    engine: Engine<C>,
    config: DriverConfig,
    ticks: u64,
}

impl<C: Clock> Driver<C> {
    /// Create a driver
    pub fn new(engine: Engine<C>, config: DriverConfig) -> Self {
        Self {
            engine,
            config,
            ticks: 0,
        }
    }

    /// Underlying engine
    pub fn engine(&self) -> &Engine<C> {
        &self.engine
    }

    /// Mutable underlying engine
    pub fn engine_mut(&mut self) -> &mut Engine<C> {
        &mut self.engine
    }

    /// Ticks executed since the last run started
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run the root operation once
    pub fn tick<F>(&mut self, root: F) -> Result<TickReport, DriverError>
    where
        F: FnOnce(&mut Engine<C>) -> error::Result<bool>,
    {
        self.ticks += 1;
        root(&mut self.engine)?;

        if !self.engine.at_root() {
            return Err(DriverError::NotUnwound {
                current: self.engine.current_name().unwrap_or_default().to_string(),
            });
        }

        let outcome = self.engine.outcome();
        let delay = self.engine.reset_delay()?;
        tracing::trace!(tick = self.ticks, ?outcome, ?delay, "tick");
        Ok(TickReport {
            tick: self.ticks,
            outcome,
            delay,
        })
    }

    /// Tick until the root succeeds or fails
    ///
    /// Starts from a fresh chain. Between ticks the clock sleeps for the
    /// requested delay, but at least `min_tick`.
    pub fn run<F>(&mut self, mut root: F, stop: Option<&AtomicBool>) -> Result<RunSummary, DriverError>
    where
        F: FnMut(&mut Engine<C>) -> error::Result<bool>,
    {
        self.engine.reset();
        self.ticks = 0;
        let started = self.engine.clock().now_ms();

        loop {
            if stop.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                tracing::info!(ticks = self.ticks, "stop requested");
                return Err(DriverError::Stopped { ticks: self.ticks });
            }
            if self.config.max_ticks > 0 && self.ticks >= self.config.max_ticks {
                return Err(DriverError::TickLimit { ticks: self.ticks });
            }

            let report = self.tick(&mut root)?;
            if report.outcome.is_finished() {
                let elapsed_ms = self.engine.clock().elapsed_since(started);
                tracing::info!(
                    ticks = self.ticks,
                    outcome = ?report.outcome,
                    elapsed_ms,
                    "run finished"
                );
                return Ok(RunSummary {
                    ticks: self.ticks,
                    outcome: report.outcome,
                    elapsed_ms,
                });
            }

            let pause = report.delay.max(self.config.min_tick());
            if !report.delay.is_zero() {
                tracing::debug!(tick = report.tick, delay_ms = report.delay.as_millis() as u64, "sleeping");
            }
            self.engine.clock().sleep(pause);
        }
    }
}
