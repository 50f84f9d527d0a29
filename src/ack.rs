//! Programming-track acknowledgement detection.
//!
//! A decoder acknowledges a programming-track command by drawing a current
//! pulse of about 6 ms. How the pulse is seen depends on the board, so the CV
//! engine only talks to an [`AckDetector`]:
//!
//! - [`PinAck`]: a comparator drives a digital input; the pulse must be seen on
//!   a run of consecutive samples.
//! - [`CurrentAck`]: the track current is sampled directly and compared with
//!   twice the baseline measured when the window opens.
//! - [`RelayedAck`]: another node detects the pulse and reports it through the
//!   transport layer, which calls [`AckFlag::signal`].
//!
//! The CV engine calls [`AckDetector::start`] before sending a command and then
//! [`AckDetector::poll`] once per sample interval until the window closes.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::digital::InputPin;

use crate::config::Config;
use crate::consts::ACK_MIN_SAMPLES;
use crate::hal::CurrentSense;

/// Samples averaged for the [`CurrentAck`] baseline.
const BASELINE_SAMPLES: u32 = 16;

/// Source of programming-track acknowledgements.
pub trait AckDetector {
    /// Opens a new detection window, discarding earlier samples.
    fn start(&mut self);
    /// Takes one sample.
    ///
    /// # Returns
    /// `true` once an acknowledgement has been detected in this window.
    fn poll(&mut self) -> bool;
}

impl<T: AckDetector + ?Sized> AckDetector for &mut T {
    fn start(&mut self) {
        (**self).start()
    }
    fn poll(&mut self) -> bool {
        (**self).poll()
    }
}

/// Acknowledgement from a digital comparator input.
#[derive(Debug)]
pub struct PinAck<P> {
    pin: P,
    run: u16,
    min_samples: u16,
    acked: bool,
}

impl<P: InputPin> PinAck<P> {
    /// Creates a detector needing [`ACK_MIN_SAMPLES`] consecutive high samples.
    pub fn new(pin: P) -> Self {
        Self::with_min_samples(pin, ACK_MIN_SAMPLES)
    }

    /// Creates a detector needing [`Config::ack_min_samples`] consecutive high samples.
    pub fn from_config(pin: P, config: &Config) -> Self {
        Self::with_min_samples(pin, config.ack_min_samples)
    }

    /// Creates a detector needing `min_samples` consecutive high samples.
    pub fn with_min_samples(pin: P, min_samples: u16) -> Self {
        Self {
            pin,
            run: 0,
            min_samples,
            acked: false,
        }
    }

    /// Releases the pin.
    pub fn free(self) -> P {
        self.pin
    }
}

impl<P: InputPin> AckDetector for PinAck<P> {
    fn start(&mut self) {
        self.run = 0;
        self.acked = false;
    }

    fn poll(&mut self) -> bool {
        if self.acked {
            return true;
        }
        // a failing read counts as an inactive sample
        if self.pin.is_high().unwrap_or(false) {
            self.run += 1;
            if self.run >= self.min_samples {
                self.acked = true;
            }
        } else {
            self.run = 0;
        }
        self.acked
    }
}

/// Acknowledgement from a current sense converter.
#[derive(Debug)]
pub struct CurrentAck<S> {
    sense: S,
    threshold: u32,
    count: u16,
    min_samples: u16,
}

impl<S: CurrentSense> CurrentAck<S> {
    /// Creates a detector needing [`ACK_MIN_SAMPLES`] samples above threshold.
    pub fn new(sense: S) -> Self {
        Self::with_min_samples(sense, ACK_MIN_SAMPLES)
    }

    /// Creates a detector needing [`Config::ack_min_samples`] samples above threshold.
    pub fn from_config(sense: S, config: &Config) -> Self {
        Self::with_min_samples(sense, config.ack_min_samples)
    }

    /// Creates a detector needing `min_samples` samples above threshold.
    pub fn with_min_samples(sense: S, min_samples: u16) -> Self {
        Self {
            sense,
            threshold: u32::MAX,
            count: 0,
            min_samples,
        }
    }

    /// Threshold of the current window.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl<S: CurrentSense> AckDetector for CurrentAck<S> {
    fn start(&mut self) {
        let sum: u32 = (0..BASELINE_SAMPLES)
            .map(|_| self.sense.read_current() as u32)
            .sum();
        self.threshold = (sum / BASELINE_SAMPLES * 2).max(1);
        self.count = 0;
    }

    fn poll(&mut self) -> bool {
        if self.count < self.min_samples && self.sense.read_current() as u32 > self.threshold {
            self.count += 1;
        }
        self.count >= self.min_samples
    }
}

/// Acknowledgement flag set by the transport layer.
#[derive(Debug, Default)]
pub struct AckFlag(AtomicBool);

impl AckFlag {
    /// Creates a cleared flag.
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Reports an acknowledgement seen by a remote detector.
    pub fn signal(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Acknowledgement relayed from another node.
#[derive(Debug)]
pub struct RelayedAck<'a> {
    flag: &'a AckFlag,
}

impl<'a> RelayedAck<'a> {
    /// Wraps `flag`, which the transport layer signals.
    pub fn new(flag: &'a AckFlag) -> Self {
        Self { flag }
    }
}

impl AckDetector for RelayedAck<'_> {
    fn start(&mut self) {
        self.flag.clear();
    }

    fn poll(&mut self) -> bool {
        self.flag.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    #[test]
    fn test_pin_ack_needs_consecutive_run() {
        let mut states = vec![PinState::High, PinState::High, PinState::Low];
        states.extend([PinState::High; 3]);
        let pin = PinMock::new(
            &states
                .iter()
                .map(|&s| PinTransaction::get(s))
                .collect::<Vec<_>>(),
        );
        let mut ack = PinAck::with_min_samples(pin, 3);
        ack.start();
        let results: Vec<bool> = (0..states.len()).map(|_| ack.poll()).collect();
        assert_eq!(results, [false, false, false, false, false, true]);
        // latched without touching the pin again
        assert!(ack.poll());
        ack.free().done();
    }

    #[test]
    fn test_pin_ack_start_clears_latch() {
        let pin = PinMock::new(&[
            PinTransaction::get(PinState::High),
            PinTransaction::get(PinState::Low),
        ]);
        let mut ack = PinAck::with_min_samples(pin, 1);
        ack.start();
        assert!(ack.poll());
        ack.start();
        assert!(!ack.poll());
        ack.free().done();
    }

    #[test]
    fn test_min_samples_from_config() {
        let config = Config {
            ack_min_samples: 2,
            ..Config::new()
        };
        let pin = PinMock::new(&[
            PinTransaction::get(PinState::High),
            PinTransaction::get(PinState::High),
        ]);
        let mut ack = PinAck::from_config(pin, &config);
        ack.start();
        assert!(!ack.poll());
        assert!(ack.poll());
        ack.free().done();

        let mut data = vec![10u16; BASELINE_SAMPLES as usize];
        data.extend([50, 50]);
        let mut ack = CurrentAck::from_config(Samples(data.iter()), &config);
        ack.start();
        assert!(!ack.poll());
        assert!(ack.poll());
    }

    struct Samples<'a>(core::slice::Iter<'a, u16>);

    impl CurrentSense for Samples<'_> {
        fn read_current(&mut self) -> u16 {
            self.0.next().copied().unwrap_or(0)
        }
    }

    #[test]
    fn test_current_ack_against_baseline() {
        let mut data = vec![100u16; BASELINE_SAMPLES as usize];
        data.extend([150, 250, 201, 200, 300]);
        let mut ack = CurrentAck::with_min_samples(Samples(data.iter()), 3);
        ack.start();
        assert_eq!(ack.threshold(), 200);
        assert!(!ack.poll());
        assert!(!ack.poll());
        assert!(!ack.poll());
        assert!(!ack.poll());
        assert!(ack.poll());
    }

    #[test]
    fn test_current_ack_zero_baseline() {
        let data = vec![0u16; BASELINE_SAMPLES as usize + 1];
        let mut ack = CurrentAck::with_min_samples(Samples(data.iter()), 1);
        ack.start();
        assert_eq!(ack.threshold(), 1);
        assert!(!ack.poll());
    }

    #[test]
    fn test_relayed_ack() {
        let flag = AckFlag::new();
        let mut ack = RelayedAck::new(&flag);
        flag.signal();
        ack.start();
        assert!(!ack.poll());
        flag.signal();
        assert!(ack.poll());
    }
}
