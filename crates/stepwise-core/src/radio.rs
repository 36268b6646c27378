//! Transceiver interface
//!
//! Leaf frames of a protocol talk to the radio through [`Transceiver`]; the
//! engine itself never does. Every call returns immediately: a transceiver
//! that needs time (warm-up, airtime, downlink window) expects the caller to
//! suspend and poll again.

use std::fmt::Debug;
use thiserror::Error;

/// Errors reported by a transceiver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// Radio is off
    #[error("radio is powered off")]
    PoweredOff,

    /// Frame rejected or lost on transmit
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Frame longer than the radio accepts
    #[error("frame of {len} bytes exceeds radio limit of {max}")]
    FrameTooLong {
        /// Offered length
        len: usize,
        /// Radio maximum
        max: usize,
    },
}

/// Result type for radio operations
pub type RadioResult<T> = Result<T, RadioError>;

/// Byte-level radio access
pub trait Transceiver: Debug {
    /// Turn the radio on; it may need a warm-up before the first send
    fn power_on(&mut self) -> RadioResult<()>;

    /// Turn the radio off
    fn power_off(&mut self);

    /// Check whether the radio is on
    fn is_powered(&self) -> bool;

    /// Transmit a frame
    fn send(&mut self, frame: &[u8]) -> RadioResult<()>;

    /// Take a received downlink, if one is waiting
    fn receive(&mut self) -> Option<Vec<u8>>;

    /// Diagnostic text sink
    fn echo(&mut self, text: &str) {
        tracing::info!(target: "stepwise::radio", "{}", text);
    }
}

#[cfg(feature = "sim")]
pub use sim::SimulatedTransceiver;

#[cfg(feature = "sim")]
mod sim {
    use super::{RadioError, RadioResult, Transceiver};
    use crate::config::RadioConfig;
    use crate::message::MAX_MESSAGE_BYTES;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Transceiver backed by a random number generator
    ///
    /// Each successful send opens one downlink; every `receive` poll then
    /// delivers it with the configured probability.
    #[derive(Debug)]
    pub struct SimulatedTransceiver {
        config: RadioConfig,
        rng: StdRng,
        powered: bool,
        downlink_pending: bool,
        sent: Vec<Vec<u8>>,
        echoed: Vec<String>,
    }

    impl SimulatedTransceiver {
        /// Create a simulated radio
        pub fn new(config: RadioConfig) -> Self {
            // Configs loaded from JSON bypass the clamping builders
            let config = config
                .clone()
                .downlink_probability(config.downlink_probability)
                .send_failure_rate(config.send_failure_rate);
            let rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            Self {
                config,
                rng,
                powered: false,
                downlink_pending: false,
                sent: Vec::new(),
                echoed: Vec::new(),
            }
        }

        /// Frames transmitted so far
        pub fn sent(&self) -> &[Vec<u8>] {
            &self.sent
        }

        /// Diagnostic lines received through `echo`
        pub fn echoed(&self) -> &[String] {
            &self.echoed
        }
    }

    impl Transceiver for SimulatedTransceiver {
        fn power_on(&mut self) -> RadioResult<()> {
            self.powered = true;
            Ok(())
        }

        fn power_off(&mut self) {
            self.powered = false;
            self.downlink_pending = false;
        }

        fn is_powered(&self) -> bool {
            self.powered
        }

        fn send(&mut self, frame: &[u8]) -> RadioResult<()> {
            if !self.powered {
                return Err(RadioError::PoweredOff);
            }
            if frame.len() > MAX_MESSAGE_BYTES {
                return Err(RadioError::FrameTooLong {
                    len: frame.len(),
                    max: MAX_MESSAGE_BYTES,
                });
            }
            if self.rng.gen_bool(self.config.send_failure_rate) {
                return Err(RadioError::SendFailed("no network ack".to_string()));
            }
            self.sent.push(frame.to_vec());
            self.downlink_pending = true;
            Ok(())
        }

        fn receive(&mut self) -> Option<Vec<u8>> {
            if !self.powered || !self.downlink_pending {
                return None;
            }
            if self.rng.gen_bool(self.config.downlink_probability) {
                self.downlink_pending = false;
                Some(self.config.downlink_payload.as_bytes().to_vec())
            } else {
                None
            }
        }

        fn echo(&mut self, text: &str) {
            tracing::info!(target: "stepwise::radio", "{}", text);
            self.echoed.push(text.to_string());
        }
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::config::RadioConfig;

    #[test]
    fn test_send_requires_power() {
        let mut radio = SimulatedTransceiver::new(RadioConfig::perfect().seed(1));
        assert_eq!(radio.send(&[1, 2, 3, 4]), Err(RadioError::PoweredOff));
        radio.power_on().unwrap();
        assert!(radio.send(&[1, 2, 3, 4]).is_ok());
        assert_eq!(radio.sent().len(), 1);
    }

    #[test]
    fn test_downlink_only_after_send() {
        let mut radio = SimulatedTransceiver::new(RadioConfig::perfect().seed(2));
        radio.power_on().unwrap();
        assert!(radio.receive().is_none());
        radio.send(&[0; 4]).unwrap();
        assert_eq!(radio.receive(), Some(b"ack".to_vec()));
        // one downlink per uplink
        assert!(radio.receive().is_none());
    }

    #[test]
    fn test_failure_rate_one_always_fails() {
        let config = RadioConfig::perfect().send_failure_rate(1.0).seed(3);
        let mut radio = SimulatedTransceiver::new(config);
        radio.power_on().unwrap();
        assert!(matches!(radio.send(&[0; 4]), Err(RadioError::SendFailed(_))));
        assert!(radio.sent().is_empty());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut radio = SimulatedTransceiver::new(RadioConfig::perfect().seed(4));
        radio.power_on().unwrap();
        let err = radio.send(&[0; 13]).unwrap_err();
        assert_eq!(err, RadioError::FrameTooLong { len: 13, max: 12 });
    }

    #[test]
    fn test_echo_is_recorded() {
        let mut radio = SimulatedTransceiver::new(RadioConfig::default().seed(5));
        radio.echo("hello");
        assert_eq!(radio.echoed(), &["hello".to_string()]);
    }
}
