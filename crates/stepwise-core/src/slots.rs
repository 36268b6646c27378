//! Persisted frame variables
//!
//! A resumable function loses its real stack frame every time control goes
//! back to the driver. The four slots below are the only values it keeps
//! across a suspension; anything composite must be packed into them.

use serde::{Deserialize, Serialize};

/// The four persisted values of a frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slots {
    /// Signed integer (counters, scaled readings)
    pub int: i32,
    /// Small unsigned value (attempt counts, flags)
    pub byte: u8,
    /// Duration or timestamp in milliseconds
    pub millis: u64,
    /// Text (received downlink, status line)
    pub text: String,
}

/// A type that maps onto one of the four slots
///
/// Lets callers write `engine.store(attempts)` and `engine.load::<u8>()`
/// without naming the slot.
pub trait SlotValue: Sized {
    /// Write `self` into its slot
    fn store(self, slots: &mut Slots);

    /// Read the slot back
    fn load(slots: &Slots) -> Self;
}

impl SlotValue for i32 {
    fn store(self, slots: &mut Slots) {
        slots.int = self;
    }

    fn load(slots: &Slots) -> Self {
        slots.int
    }
}

impl SlotValue for u8 {
    fn store(self, slots: &mut Slots) {
        slots.byte = self;
    }

    fn load(slots: &Slots) -> Self {
        slots.byte
    }
}

impl SlotValue for u64 {
    fn store(self, slots: &mut Slots) {
        slots.millis = self;
    }

    fn load(slots: &Slots) -> Self {
        slots.millis
    }
}

impl SlotValue for String {
    fn store(self, slots: &mut Slots) {
        slots.text = self;
    }

    fn load(slots: &Slots) -> Self {
        slots.text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_independent() {
        let mut slots = Slots::default();
        (-7i32).store(&mut slots);
        3u8.store(&mut slots);
        1_500u64.store(&mut slots);
        "ack".to_string().store(&mut slots);

        assert_eq!(i32::load(&slots), -7);
        assert_eq!(u8::load(&slots), 3);
        assert_eq!(u64::load(&slots), 1_500);
        assert_eq!(String::load(&slots), "ack");
    }
}
