//! Foreground command API.
//!
//! [`Station`] is the half of the crate that the command dispatcher talks to.
//! Every operation builds a packet, waits for the single slot in [`Shared`] to
//! become free and hands the packet over. The wait is bounded by one frame of
//! the transmitter, so there is no timeout.
//!
//! The CV engine (programming track, POM and XPOM) is implemented on `Station`
//! as well; see the `pgm_*`, `pom_*` and `xpom_*` methods.
//!
//! ## Example
//!
//! ```rust,ignore
//! static SHARED: Shared = Shared::new();
//!
//! let mut station = Station::new(&SHARED, delay, PinAck::new(ack_pin), Config::new());
//! station.booster_on();
//! station.send_speed_28(Some(0), 3, Direction::Forward, 14)?;
//! loop {
//!     station.service();
//!     // dispatch host commands
//! }
//! ```

use embedded_hal::delay::DelayNs;

use crate::ack::AckDetector;
use crate::config::Config;
use crate::consts::{MAX_LOCOS, NO_ADDRESS, SUBMIT_SPIN_US};
use crate::error::{Error, Result};
use crate::location::{Location, LocationTable};
use crate::packet::{self, Direction, FunctionGroup, Packet, SwitchState};
use crate::railcom::{DynValue, XpomSlot};
use crate::shared::{Mode, Shared};
use crate::stats::LocoTable;

/// A deferred basic-accessory deactivate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct SwitchReset {
    pub(crate) address: u16,
    pub(crate) state: SwitchState,
    pub(crate) due: u32,
}

/// The foreground side of a track output.
///
/// ## Type Parameters
///
/// - `D`: delay used for busy waits and acknowledgement sampling
/// - `A`: programming-track acknowledgement source
#[derive(Debug)]
pub struct Station<'a, D, A> {
    pub(crate) shared: &'a Shared,
    pub(crate) delay: D,
    pub(crate) ack: A,
    pub(crate) config: Config,
    locos: LocoTable,
    switch_reset: Option<SwitchReset>,
    locations: LocationTable,
}

impl<'a, D, A> Station<'a, D, A>
where
    D: DelayNs,
    A: AckDetector,
{
    /// Creates the foreground handle for the output described by `shared`.
    pub fn new(shared: &'a Shared, delay: D, ack: A, config: Config) -> Self {
        Self {
            shared,
            delay,
            ack,
            config,
            locos: LocoTable::new(),
            switch_reset: None,
            locations: LocationTable::new(),
        }
    }

    /// The shared context.
    pub fn shared(&self) -> &'a Shared {
        self.shared
    }

    /// Hands `packet` to the transmitter, spinning until the slot is free.
    pub fn submit(&mut self, packet: &Packet) {
        loop {
            match self.shared.try_submit(packet) {
                Ok(()) => return,
                Err(nb::Error::WouldBlock) => self.delay.delay_us(SUBMIT_SPIN_US),
                Err(nb::Error::Other(never)) => match never {},
            }
        }
    }

    /// Frames `payload` for `address` and submits it.
    ///
    /// # Arguments
    /// - `loco`: statistics slot the RailCom answers are booked to. If the slot
    ///   was last used with another address its statistics start over.
    /// - `address`: loco address, `0` for broadcast or [`NO_ADDRESS`].
    pub fn submit_packet(&mut self, loco: Option<u8>, address: u16, payload: &[u8]) -> Result<()> {
        if let Some(index) = loco {
            if index as usize >= MAX_LOCOS {
                return Err(Error::InvalidLocoIndex);
            }
        }
        let packet = Packet::new(address, payload)?.with_loco(loco);
        if let Some(index) = loco {
            if self.locos.update(index, address) {
                debug!("loco {} now address {}", index, address);
                self.shared.reset_stats(index);
            }
        }
        self.submit(&packet);
        Ok(())
    }

    /// Switches the operating mode. Takes effect with the next frame.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.shared.mode() != mode {
            info!("mode {}", mode as u8);
        }
        self.shared.set_mode(mode);
    }

    /// Current operating mode.
    pub fn mode(&self) -> Mode {
        self.shared.mode()
    }

    /// 28 speed step command.
    pub fn send_speed_28(
        &mut self,
        loco: Option<u8>,
        address: u16,
        direction: Direction,
        speed: u8,
    ) -> Result<()> {
        self.submit_packet(loco, address, &packet::speed_28(direction, speed))
    }

    /// 126 speed step command.
    pub fn send_speed_126(
        &mut self,
        loco: Option<u8>,
        address: u16,
        direction: Direction,
        speed: u8,
    ) -> Result<()> {
        self.submit_packet(loco, address, &packet::speed_126(direction, speed))
    }

    /// Function group command.
    pub fn send_functions(
        &mut self,
        loco: Option<u8>,
        address: u16,
        group: FunctionGroup,
        mask: u8,
    ) -> Result<()> {
        self.submit_packet(loco, address, &packet::functions(group, mask))
    }

    /// Broadcast reset packet.
    pub fn reset(&mut self) -> Result<()> {
        self.submit_packet(None, 0, &packet::decoder_reset())
    }

    /// Broadcast stop.
    pub fn stop(&mut self) -> Result<()> {
        self.submit_packet(None, 0, &packet::stop())
    }

    /// Broadcast emergency stop.
    pub fn emergency_stop(&mut self) -> Result<()> {
        self.submit_packet(None, 0, &packet::emergency_stop())
    }

    /// Decoder reset addressed to one decoder.
    pub fn reset_decoder(&mut self, address: u16) -> Result<()> {
        self.submit_packet(None, address, &packet::decoder_reset())
    }

    /// Decoder hard reset addressed to one decoder.
    pub fn hard_reset_decoder(&mut self, address: u16) -> Result<()> {
        self.submit_packet(None, address, &packet::decoder_hard_reset())
    }

    /// Asks `address` for a RailCom answer; used to poll pending POM values.
    pub fn get_ack(&mut self, loco: Option<u8>, address: u16) -> Result<()> {
        self.submit_packet(loco, address, &packet::get_ack())
    }

    /// Acknowledgement request to the broadcast address. Every RailCom decoder
    /// answers on channel 1, which identifies decoders of unknown address.
    pub fn track_search(&mut self) -> Result<()> {
        self.submit_packet(None, 0, &packet::get_ack())
    }

    /// Activates a basic accessory output and schedules its deactivate.
    ///
    /// A deactivate still pending from an earlier switch command is sent first.
    pub fn base_switch_set(&mut self, address: u16, state: SwitchState) -> Result<()> {
        let payload = packet::basic_accessory(address, state, true)?;
        self.flush_switch_reset()?;
        self.submit_packet(None, NO_ADDRESS, &payload)?;
        self.switch_reset = Some(SwitchReset {
            address,
            state,
            due: self
                .shared
                .millis()
                .wrapping_add(self.config.switch_reset_delay_ms),
        });
        Ok(())
    }

    /// Deactivates a basic accessory output.
    pub fn base_switch_reset(&mut self, address: u16, state: SwitchState) -> Result<()> {
        self.submit_packet(
            None,
            NO_ADDRESS,
            &packet::basic_accessory(address, state, false)?,
        )?;
        if self
            .switch_reset
            .is_some_and(|r| r.address == address && r.state == state)
        {
            self.switch_reset = None;
        }
        Ok(())
    }

    /// Sends an 8-bit aspect to an extended accessory decoder.
    pub fn extended_accessory_set(&mut self, address: u16, value: u8) -> Result<()> {
        self.submit_packet(None, NO_ADDRESS, &packet::extended_accessory(address, value)?)
    }

    fn flush_switch_reset(&mut self) -> Result<()> {
        match self.switch_reset.take() {
            Some(r) => self.base_switch_reset(r.address, r.state),
            None => Ok(()),
        }
    }

    /// Foreground housekeeping; call from the main loop.
    ///
    /// Sends the deferred switch deactivate once it is due.
    pub fn service(&mut self) -> Result<()> {
        let now = self.shared.millis();
        match self.switch_reset {
            Some(r) if now.wrapping_sub(r.due) < u32::MAX / 2 => self.flush_switch_reset(),
            _ => Ok(()),
        }
    }

    /// Switches the booster on.
    ///
    /// XPOM slots are blocked first so answers that arrive with the first
    /// cutouts cannot be taken for results of a later read.
    pub fn booster_on(&mut self) {
        self.shared.block_xpom();
        if !self.shared.booster() {
            info!("booster on");
        }
        self.shared.set_booster(true);
    }

    /// Switches the booster off and forgets all transient state.
    pub fn booster_off(&mut self) {
        if self.shared.booster() {
            info!("booster off");
        }
        self.shared.set_booster(false);
        self.shared.block_xpom();
        self.shared.clear_timestamps();
        self.switch_reset = None;
    }

    /// RailCom channel-1 address, if seen within the last second.
    pub fn channel1_address(&self) -> Option<u16> {
        self.shared.channel1_address()
    }

    /// Channel-2 response rate of `loco` over the last completed window, in percent.
    pub fn rc2_rate(&self, loco: u8) -> Option<u8> {
        self.shared.rc2_slot(loco).map(|s| s.rate())
    }

    /// Milliseconds since `loco` last answered on channel 2.
    pub fn rc2_response_age(&self, loco: u8) -> Option<u32> {
        let now = self.shared.millis();
        self.shared
            .rc2_slot(loco)
            .and_then(|s| s.response_age(now))
    }

    /// Last POM value, consumed by reading.
    pub fn take_cv(&self) -> Option<u8> {
        self.shared.take_cv()
    }

    /// XPOM slot of `sequence`.
    pub fn xpom(&self, sequence: usize) -> Option<XpomSlot> {
        self.shared.xpom(sequence)
    }

    /// Last dynamic variable.
    pub fn dynamic(&self) -> Option<DynValue> {
        self.shared.dynamic()
    }

    /// Records a location report from a local detector.
    pub fn report_location(&mut self, address: u16, section: u16) {
        let now = self.shared.millis();
        self.locations.report(address, section, now);
    }

    /// Latest location of `address`, if reported within the staleness limit.
    pub fn location(&self, address: u16) -> Option<Location> {
        self.locations
            .get(address, self.shared.millis(), self.config.location_stale_ms)
    }

    /// Every location reported within the staleness limit.
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations
            .fresh(self.shared.millis(), self.config.location_stale_ms)
    }

    /// Pauses the foreground for `ms` milliseconds of track time.
    #[cfg(test)]
    pub(crate) fn wait_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    #[cfg(test)]
    pub(crate) fn pending_switch_reset(&self) -> Option<SwitchReset> {
        self.switch_reset
    }
}
