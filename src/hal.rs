//! Hardware seams that `embedded-hal` does not cover.
//!
//! The track signal, cutout and booster lines are plain
//! [`OutputPin`](embedded_hal::digital::OutputPin)s and the acknowledgement
//! line is an [`InputPin`](embedded_hal::digital::InputPin). The RailCom UART
//! and the current sense ADC are modelled here.

/// Receive side of the RailCom detector UART (250 kBaud, 8N1).
///
/// All methods are called from the tick interrupt and must not block.
pub trait RailcomReceiver {
    /// Starts receiving.
    fn enable(&mut self);
    /// Stops receiving.
    fn disable(&mut self);
    /// Drops everything received so far.
    fn flush(&mut self);
    /// Moves up to `buf.len()` received bytes into `buf`.
    ///
    /// # Returns
    /// The number of bytes written.
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

/// Receiver for boards without a RailCom detector. Never yields data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReceiver;

impl RailcomReceiver for NoReceiver {
    fn enable(&mut self) {}
    fn disable(&mut self) {}
    fn flush(&mut self) {}
    fn read(&mut self, _buf: &mut [u8]) -> usize {
        0
    }
}

/// One reading of the programming-track current.
pub trait CurrentSense {
    /// Raw converter value, proportional to the track current.
    fn read_current(&mut self) -> u16;
}

impl<T: RailcomReceiver + ?Sized> RailcomReceiver for &mut T {
    fn enable(&mut self) {
        (**self).enable()
    }
    fn disable(&mut self) {
        (**self).disable()
    }
    fn flush(&mut self) {
        (**self).flush()
    }
    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }
}
