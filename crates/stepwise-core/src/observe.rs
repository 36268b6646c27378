//! Frame lifecycle diagnostics
//!
//! Observers are purely passive: nothing in the engine depends on them, and
//! none is installed unless asked for. [`TracingObserver`] forwards events to
//! `tracing` at debug level; any `FnMut(&FrameEvent)` closure works too.

use crate::step::Step;
use std::fmt;

/// Something that happened to a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A new frame was entered
    Created {
        /// Function name
        name: String,
        /// Initial step
        step: Step,
        /// Chain depth (root = 0)
        depth: usize,
    },
    /// An existing frame was re-entered
    Resumed {
        /// Function name
        name: String,
        /// Stored step returned to the caller
        step: Step,
    },
    /// An unfinished child was discarded for a differently named one
    Replaced {
        /// Discarded child
        old: String,
        /// Newly requested child
        new: String,
        /// Step the discarded child was at
        old_step: Step,
    },
    /// Control returned from a frame to its parent
    Popped {
        /// Frame that was left
        from: String,
        /// Frame that is now current
        to: String,
        /// Step the left frame is at
        step: Step,
        /// Step it advances to once its child completes
        next: Step,
    },
    /// A parent consumed a finished child
    Transition {
        /// Parent frame
        name: String,
        /// Finished child
        child: String,
        /// Parent step before
        from: Step,
        /// Parent step after
        to: Step,
    },
    /// A frame was freed
    Destroyed {
        /// Function name
        name: String,
    },
    /// Every frame was dropped
    Reset {
        /// Number of frames freed
        frames: usize,
    },
}

impl fmt::Display for FrameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameEvent::Created { name, step, depth } => {
                write!(f, "new state {} (step {}, depth {})", name, step, depth)
            }
            FrameEvent::Resumed { name, step } => write!(f, "resume state {}, step {}", name, step),
            FrameEvent::Replaced { old, new, old_step } => {
                write!(f, "replace unfinished {} (step {}) with {}", old, old_step, new)
            }
            FrameEvent::Popped { from, to, step, next } => {
                write!(f, "pop {} (step {}, next {}) to {}", from, step, next, to)
            }
            FrameEvent::Transition { name, child, from, to } => {
                write!(f, "{} finished under {}: step {} -> {}", child, name, from, to)
            }
            FrameEvent::Destroyed { name } => write!(f, "delete state {}", name),
            FrameEvent::Reset { frames } => write!(f, "reset, {} frames freed", frames),
        }
    }
}

/// Receiver of frame lifecycle events
pub trait FrameObserver {
    /// Called synchronously for every event
    fn on_event(&mut self, event: &FrameEvent);
}

impl<F> FrameObserver for F
where
    F: FnMut(&FrameEvent),
{
    fn on_event(&mut self, event: &FrameEvent) {
        self(event)
    }
}

/// Observer that logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl FrameObserver for TracingObserver {
    fn on_event(&mut self, event: &FrameEvent) {
        tracing::debug!(target: "stepwise::frames", "{}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_observer() {
        let mut seen = Vec::new();
        {
            let mut observer = |event: &FrameEvent| seen.push(event.clone());
            observer.on_event(&FrameEvent::Destroyed {
                name: "listen".into(),
            });
        }
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_event_display() {
        let event = FrameEvent::Popped {
            from: "send".into(),
            to: "uplink".into(),
            step: Step::new(3),
            next: Step::new(4),
        };
        assert_eq!(event.to_string(), "pop send (step 3, next 4) to uplink");
    }
}
