use crate::{Command, Error, IoWire, OpCode, WireMode};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use log::trace;

// Reset: >= 1 ms low, presence sampled inside the 60-240 us window,
// whole initialization phase >= 480 us.
const RESET_LOW_US: u32 = 1500;
const PRESENCE_WAIT_US: u32 = 60;
const PRESENCE_SAMPLE_US: u32 = 5;
const RESET_WINDOW_US: u32 = 600;
const PRESENCE_TAIL_US: u32 = RESET_WINDOW_US - PRESENCE_WAIT_US - PRESENCE_SAMPLE_US;

// Time slots are 60-120 us long and need >= 1 us recovery between them.
const SLOT_US: u32 = 90;
const SLOT_START_US: u32 = 2;
const WRITE_1_RELEASE_US: u32 = 5;
// Sampling must happen within 15 us of the slot start.
const READ_SAMPLE_US: u32 = 5;
const READ_TAIL_US: u32 = SLOT_US - SLOT_START_US - READ_SAMPLE_US;
const RECOVERY_US: u32 = 2;

/// How the sensor is powered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerMode {
    /// Dedicated VDD pin
    #[default]
    External,
    /// Powered from the data line, the master must source current during conversion
    ///
    /// *NOTE* the built-in `(pin,)` and `(input, output)` wires have no
    /// push-pull stage to switch to: [`Driver::strong_pullup`] only releases
    /// the line there. Parasite-powered sensors need an [`IoWire`] whose
    /// [`WireMode::PullUpOutput`] really drives the line.
    Parasite,
}

/// Bus master owning the line and the delay source
pub struct Driver<W: IoWire, D: DelayNs> {
    io_wire: W,
    delay: D,
    power_mode: PowerMode,
}

impl<E: Debug, W: IoWire<Error = E>, D: DelayNs> Driver<W, D> {
    /// Takes over the line and leaves the bus released
    pub fn new(io_wire: W, delay: D, power_mode: PowerMode) -> Result<Self, Error<E>> {
        let mut driver = Driver {
            io_wire,
            delay,
            power_mode,
        };
        driver.release_bus()?;
        Ok(driver)
    }

    pub fn into_inner(self) -> (W, D) {
        (self.io_wire, self.delay)
    }

    pub fn power_mode(&self) -> PowerMode {
        self.power_mode
    }

    /// Access to the delay source, e.g. to wait out a conversion
    pub fn delay(&mut self) -> &mut D {
        &mut self.delay
    }

    pub fn reset_skip_write_read(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Error<E>> {
        self.reset()?;
        self.skip()?;
        self.write_bytes(write)?;
        self.read_bytes(read)?;
        Ok(())
    }

    pub fn reset_skip_write_only(&mut self, write: &[u8]) -> Result<(), Error<E>> {
        self.reset()?;
        self.skip()?;
        self.write_bytes(write)?;
        Ok(())
    }

    pub fn skip(&mut self) -> Result<(), Error<E>> {
        self.write_command(Command::SkipRom)?;
        Ok(())
    }

    /// Performs a reset and listens for a presence pulse
    /// Returns Err(NoPresence) if the line stayed high during the response window
    pub fn reset(&mut self) -> Result<(), Error<E>> {
        if self.check_presence()? {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    /// Performs a reset and reports whether a device answered it
    pub fn check_presence(&mut self) -> Result<bool, E> {
        self.drive_low()?;
        self.delay.delay_us(RESET_LOW_US);
        self.release_bus()?;

        self.delay.delay_us(PRESENCE_WAIT_US);
        self.delay.delay_us(PRESENCE_SAMPLE_US);
        let presence = self.io_wire.is_low()?;

        self.delay.delay_us(PRESENCE_TAIL_US);
        trace!("reset: presence {}", presence);
        Ok(presence)
    }

    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<(), E> {
        for d in dst {
            *d = self.read_byte()?;
        }
        Ok(())
    }

    /// Reads a byte, least significant bit first
    pub fn read_byte(&mut self) -> Result<u8, E> {
        let mut byte = 0_u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit()? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    pub fn read_bit(&mut self) -> Result<bool, E> {
        self.drive_low()?;
        self.delay.delay_us(SLOT_START_US);
        self.release_bus()?;
        self.delay.delay_us(READ_SAMPLE_US);
        let val = self.io_wire.is_high()?;
        self.delay.delay_us(READ_TAIL_US);
        self.delay.delay_us(RECOVERY_US);
        Ok(val)
    }

    pub fn write_command(&mut self, cmd: impl OpCode) -> Result<(), E> {
        let op_code = cmd.op_code();
        trace!("command {:#04x}", op_code);
        self.write_byte(op_code)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), E> {
        for b in bytes {
            self.write_byte(*b)?;
        }
        Ok(())
    }

    /// Writes a byte, least significant bit first
    pub fn write_byte(&mut self, byte: u8) -> Result<(), E> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit((byte & 0x01) == 0x01)?;
            byte >>= 1;
        }
        Ok(())
    }

    pub fn write_bit(&mut self, high: bool) -> Result<(), E> {
        self.drive_low()?;
        if high {
            // the sensor samples 15-45 us into the slot, release well before
            self.delay.delay_us(SLOT_START_US);
            self.release_bus()?;
            self.delay.delay_us(SLOT_US - WRITE_1_RELEASE_US);
        } else {
            self.delay.delay_us(SLOT_US);
            self.release_bus()?;
        }
        self.delay.delay_us(RECOVERY_US);
        Ok(())
    }

    /// Sources current through the line, needed by parasite-powered sensors
    /// while they convert
    pub fn strong_pullup(&mut self) -> Result<(), E> {
        self.io_wire.set_high()?;
        self.io_wire.set_mode(WireMode::PullUpOutput)
    }

    #[inline(always)]
    fn drive_low(&mut self) -> Result<(), E> {
        self.io_wire.set_mode(WireMode::PullUpOutput)?;
        self.io_wire.set_low()
    }

    #[inline(always)]
    fn release_bus(&mut self) -> Result<(), E> {
        self.io_wire.set_mode(WireMode::FloatingInput)
    }
}
