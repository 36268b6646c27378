//! Resumable call-chain engine
//!
//! Lets a polling loop run nested, multi-step operations without blocking.
//! Each participating function brackets its body with [`Engine::begin`] and
//! one of [`Engine::suspend`] / [`Engine::end`]:
//!
//! ```text
//!  tick N                                   tick N+1
//!  driver ─ begin(uplink) ─ body            driver ─ begin(uplink) = resume
//!             └ begin(listen) ─ body                   └ begin(listen) = resume
//!                 suspend_for(RX, 1s)                      end(true)
//!             suspend(SEND)  ◄─ delay moves up         ◄─ uplink advances to SEND
//!  reset_delay() = 1s                       reset_delay() = 0
//! ```
//!
//! ## Propagation
//!
//! Every pop (suspend or end) moves the current pointer to the parent and
//! then inspects that parent's child:
//!
//! 1. a pending wake time moves up one level;
//! 2. an unfinished child is left alone;
//! 3. a failed child marks the parent failed and is freed;
//! 4. a successful child advances the parent to its stored next step and is
//!    freed.
//!
//! Because the chain is an ordinary synchronous call chain, the outcome of a
//! leaf reaches the root within the same tick, one level per pop.

use crate::clock::{Clock, SystemClock};
use crate::config::{ChildPolicy, EngineConfig};
use crate::error::{EngineError, Result};
use crate::frame::{Frame, FrameArena, FrameId};
use crate::observe::{FrameEvent, FrameObserver, TracingObserver};
use crate::slots::{SlotValue, Slots};
use crate::step::{Outcome, Step};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Read-only view of one frame in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameSnapshot {
    /// Function name
    pub name: String,
    /// Stored step
    pub current_step: Step,
    /// Step to advance to once the child completes
    pub next_step: Step,
    /// Pending absolute wake time
    pub wake_at: Option<u64>,
    /// Distance from the root
    pub depth: usize,
    /// Whether the engine's current pointer is on this frame
    pub is_current: bool,
}

/// How a frame is left
#[derive(Debug, Clone, Copy)]
enum Pop {
    Suspend(Step),
    End(Step),
}

/// The call-chain coordinator
pub struct Engine<C: Clock = SystemClock> {
    frames: FrameArena,
    root: Option<FrameId>,
    current: Option<FrameId>,
    config: EngineConfig,
    clock: C,
    observer: Option<Box<dyn FrameObserver>>,
}

impl Engine<SystemClock> {
    /// Create an engine on the wall clock
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, SystemClock::new())
    }
}

impl Default for Engine<SystemClock> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<C: Clock> Engine<C> {
    /// Create an engine on a specific clock
    pub fn with_clock(config: EngineConfig, clock: C) -> Self {
        Self {
            frames: FrameArena::new(config.max_frames),
            root: None,
            current: None,
            config,
            clock,
            observer: None,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clock used for wake times
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Install a lifecycle observer, replacing any previous one
    pub fn set_observer(&mut self, observer: impl FrameObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Remove the lifecycle observer
    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    /* ===================== Entry ===================== */

    /// Enter (or re-enter) the function `name`
    ///
    /// Returns the step the function should dispatch on: `first_step` for a
    /// fresh frame, the stored step for a resumed one.
    pub fn begin(&mut self, name: &str, first_step: Step) -> Result<Step> {
        let Some(current) = self.current else {
            let id = self.allocate(Frame::new(name, first_step, None))?;
            self.root = Some(id);
            self.current = Some(id);
            if self.observing() {
                self.emit(FrameEvent::Created {
                    name: name.to_string(),
                    step: first_step,
                    depth: 0,
                });
            }
            return Ok(first_step);
        };

        let (same_level, stored_step, child) = {
            let frame = self.frame(current)?;
            (frame.name == name, frame.current_step, frame.child)
        };

        if same_level {
            if self.observing() {
                self.emit(FrameEvent::Resumed {
                    name: name.to_string(),
                    step: stored_step,
                });
            }
            return Ok(stored_step);
        }

        // A finished frame never gets a child
        if stored_step.is_terminal() {
            return Err(EngineError::ParentFinished {
                parent: self.frame(current)?.name.clone(),
                requested: name.to_string(),
            });
        }

        if let Some(child_id) = child {
            let existing = self.frame(child_id)?;
            if existing.name == name {
                let step = existing.current_step;
                self.current = Some(child_id);
                if self.observing() {
                    self.emit(FrameEvent::Resumed {
                        name: name.to_string(),
                        step,
                    });
                }
                return Ok(step);
            }

            let old_name = existing.name.clone();
            let old_step = existing.current_step;
            if !old_step.is_terminal() {
                if self.config.child_policy == ChildPolicy::Reject {
                    return Err(EngineError::ChildBusy {
                        current: old_name,
                        requested: name.to_string(),
                    });
                }
                tracing::warn!(
                    old = %old_name,
                    new = %name,
                    step = %old_step,
                    "discarding unfinished child"
                );
                if self.observing() {
                    self.emit(FrameEvent::Replaced {
                        old: old_name,
                        new: name.to_string(),
                        old_step,
                    });
                }
            }
            self.frame_mut(current)?.child = None;
            self.destroy(child_id);
        } else if !self.frames.has_room() {
            return Err(EngineError::FrameLimit {
                limit: self.frames.capacity(),
            });
        }

        let id = self.allocate(Frame::new(name, first_step, Some(current)))?;
        self.frame_mut(current)?.child = Some(id);
        self.current = Some(id);
        if self.observing() {
            let depth = self.depth(id);
            self.emit(FrameEvent::Created {
                name: name.to_string(),
                step: first_step,
                depth,
            });
        }
        Ok(first_step)
    }

    /* ===================== Slots ===================== */

    /// Persisted variables of the current frame
    pub fn slots(&self) -> Result<&Slots> {
        let id = self.current_id()?;
        Ok(&self.frame(id)?.slots)
    }

    /// Mutable persisted variables of the current frame
    pub fn slots_mut(&mut self) -> Result<&mut Slots> {
        let id = self.current_id()?;
        Ok(&mut self.frame_mut(id)?.slots)
    }

    /// Save a value into the slot its type maps to
    pub fn store<T: SlotValue>(&mut self, value: T) -> Result<()> {
        value.store(self.slots_mut()?);
        Ok(())
    }

    /// Read a value back from the slot its type maps to
    pub fn load<T: SlotValue>(&self) -> Result<T> {
        Ok(T::load(self.slots()?))
    }

    /* ===================== Leaving a frame ===================== */

    /// Pause the current function; resume at `next_step` once its child
    /// (if any) has succeeded
    ///
    /// Returns `false` if the frame control returns to has failed.
    pub fn suspend(&mut self, next_step: Step) -> Result<bool> {
        self.suspend_for(next_step, Duration::ZERO)
    }

    /// Like [`suspend`](Self::suspend), also asking the driver to wait
    /// `delay` before the next tick
    pub fn suspend_for(&mut self, next_step: Step, delay: Duration) -> Result<bool> {
        self.pop(Pop::Suspend(next_step))?;
        if !delay.is_zero() {
            let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            let wake_at = self.clock.now_ms().saturating_add(millis);
            let id = self.current_id()?;
            self.frame_mut(id)?.wake_at = Some(wake_at);
        }
        self.propagate()?;
        Ok(self.status() != Step::FAILURE)
    }

    /// Pause at the same step ("wait again")
    pub fn suspend_same(&mut self) -> Result<bool> {
        let step = self.frame(self.current_id()?)?.current_step;
        self.suspend(step)
    }

    /// Pause at the same step and ask the driver to wait `delay`
    pub fn suspend_same_for(&mut self, delay: Duration) -> Result<bool> {
        let step = self.frame(self.current_id()?)?.current_step;
        self.suspend_for(step, delay)
    }

    /// Finish the current function with success or failure
    ///
    /// The outcome is handed to the parent during propagation. Returns
    /// `success` unchanged.
    pub fn end(&mut self, success: bool) -> Result<bool> {
        let step = if success { Step::SUCCESS } else { Step::FAILURE };
        self.pop(Pop::End(step))?;
        self.propagate()?;
        Ok(success)
    }

    /* ===================== Driver queries ===================== */

    /// Step of the current frame, [`Step::IDLE`] when there is none
    pub fn status(&self) -> Step {
        self.current
            .and_then(|id| self.frames.get(id))
            .map_or(Step::IDLE, |frame| frame.current_step)
    }

    /// [`status`](Self::status) classified for the driver
    pub fn outcome(&self) -> Outcome {
        Outcome::from(self.status())
    }

    /// Take the current frame's pending delay
    ///
    /// Returns the time left until the requested wake time and clears it.
    /// Zero when nothing is pending or the wake time has passed.
    pub fn reset_delay(&mut self) -> Result<Duration> {
        let id = self.current_id()?;
        let now = self.clock.now_ms();
        let wake_at = self.frame_mut(id)?.wake_at.take();
        Ok(wake_at.map_or(Duration::ZERO, |wake_at| {
            Duration::from_millis(wake_at.saturating_sub(now))
        }))
    }

    /// Drop every frame; the next `begin` starts a fresh root
    pub fn reset(&mut self) {
        let frames = self.frames.len();
        self.frames.clear();
        self.root = None;
        self.current = None;
        if frames > 0 && self.observing() {
            self.emit(FrameEvent::Reset { frames });
        }
    }

    /// Check whether a root frame exists
    pub fn is_active(&self) -> bool {
        self.root.is_some()
    }

    /// Check whether control is back on the root frame
    pub fn at_root(&self) -> bool {
        self.current.is_some() && self.current == self.root
    }

    /// Name of the current frame
    pub fn current_name(&self) -> Option<&str> {
        self.current
            .and_then(|id| self.frames.get(id))
            .map(|frame| frame.name.as_str())
    }

    /// Number of live frames
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Frames from the root down to the deepest live descendant
    pub fn chain(&self) -> Vec<FrameSnapshot> {
        let mut chain = Vec::new();
        let mut next = self.root;
        while let Some(id) = next {
            let Some(frame) = self.frames.get(id) else {
                break;
            };
            chain.push(FrameSnapshot {
                name: frame.name.clone(),
                current_step: frame.current_step,
                next_step: frame.next_step,
                wake_at: frame.wake_at,
                depth: chain.len(),
                is_current: self.current == Some(id),
            });
            next = frame.child;
        }
        chain
    }

    /* ===================== Internals ===================== */

    fn current_id(&self) -> Result<FrameId> {
        self.current.ok_or(EngineError::NoActiveFrame)
    }

    fn frame(&self, id: FrameId) -> Result<&Frame> {
        self.frames.get(id).ok_or(EngineError::StaleFrame(id))
    }

    fn frame_mut(&mut self, id: FrameId) -> Result<&mut Frame> {
        self.frames.get_mut(id).ok_or(EngineError::StaleFrame(id))
    }

    fn allocate(&mut self, frame: Frame) -> Result<FrameId> {
        self.frames.insert(frame).ok_or(EngineError::FrameLimit {
            limit: self.frames.capacity(),
        })
    }

    fn depth(&self, id: FrameId) -> usize {
        let mut depth = 0;
        let mut next = self.frames.get(id).and_then(|frame| frame.parent);
        while let Some(parent) = next {
            depth += 1;
            next = self.frames.get(parent).and_then(|frame| frame.parent);
        }
        depth
    }

    /// Record the step bookkeeping and move to the parent
    fn pop(&mut self, how: Pop) -> Result<()> {
        let id = self.current_id()?;
        let (child, parent) = {
            let frame = self.frame_mut(id)?;
            match how {
                // A terminal step is never overwritten by a suspend
                Pop::Suspend(next) if !frame.current_step.is_terminal() => {
                    frame.next_step = next;
                    if !next.is_idle() && frame.child.is_none() {
                        frame.current_step = next;
                        frame.next_step = Step::IDLE;
                    }
                }
                Pop::Suspend(_) => {}
                Pop::End(step) => {
                    frame.current_step = step;
                    frame.next_step = Step::IDLE;
                }
            }
            let child = match how {
                Pop::End(_) => frame.child.take(),
                Pop::Suspend(_) => None,
            };
            (child, frame.parent)
        };

        // A finished frame keeps no active child
        if let Some(child) = child {
            self.destroy(child);
        }

        if let Some(parent) = parent {
            self.current = Some(parent);
        }

        if self.observing() {
            let from = self.frame(id)?;
            let event = FrameEvent::Popped {
                from: from.name.clone(),
                to: self.current_name().unwrap_or_default().to_string(),
                step: from.current_step,
                next: from.next_step,
            };
            self.emit(event);
        }
        Ok(())
    }

    /// Hand the child's delay and outcome to the current frame
    fn propagate(&mut self) -> Result<()> {
        let id = self.current_id()?;
        let Some(child_id) = self.frame(id)?.child else {
            return Ok(());
        };

        let (child_wake, child_step) = {
            let child = self.frame_mut(child_id)?;
            (child.wake_at.take(), child.current_step)
        };
        if let Some(wake_at) = child_wake {
            self.frame_mut(id)?.wake_at = Some(wake_at);
        }

        if !child_step.is_terminal() {
            return Ok(());
        }

        let child_name = self.frame(child_id)?.name.clone();
        let frame = self.frame_mut(id)?;
        let from = frame.current_step;
        // A frame that already finished keeps its outcome
        if !from.is_terminal() {
            frame.current_step = if child_step == Step::FAILURE {
                Step::FAILURE
            } else {
                frame.next_step
            };
        }
        frame.next_step = Step::IDLE;
        frame.child = None;
        let to = frame.current_step;

        if child_step == Step::FAILURE {
            tracing::warn!(frame = %child_name, "step failed");
        }
        if self.observing() {
            let name = self.frame(id)?.name.clone();
            self.emit(FrameEvent::Transition {
                name,
                child: child_name,
                from,
                to,
            });
        }
        self.destroy(child_id);
        Ok(())
    }

    fn destroy(&mut self, id: FrameId) {
        let removed = self.frames.remove_subtree(id);
        if self.observing() {
            for name in removed {
                self.emit(FrameEvent::Destroyed { name });
            }
        }
    }

    fn observing(&self) -> bool {
        self.config.trace_frames || self.observer.is_some()
    }

    fn emit(&mut self, event: FrameEvent) {
        if self.config.trace_frames {
            TracingObserver.on_event(&event);
        }
        if let Some(observer) = self.observer.as_mut() {
            observer.on_event(&event);
        }
    }
}

impl<C: Clock> fmt::Debug for Engine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("frames", &self.frames.len())
            .field("current", &self.current_name())
            .field("status", &self.status())
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
