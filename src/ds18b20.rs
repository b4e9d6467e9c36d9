//! DS18B20 digital thermometer, addressed with `Skip ROM`
//!
//! Only one sensor may share the bus. A measurement is two separate
//! exchanges: [`Ds18b20::start_conversion`] triggers the conversion and
//! returns how long to wait, [`Ds18b20::read_temperature`] then fetches and
//! validates the scratchpad. Waiting in between is up to the caller.

use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::{ensure_correct_crc8, Driver, Error, IoWire, OpCode, PowerMode, Sensor};
use core::fmt::Debug;

/// Delay reported after starting a conversion, independent of the resolution
pub const CONVERSION_DELAY_MS: u16 = 1000;

/// Degrees per LSB of the temperature register
const TEMPERATURE_LSB: f32 = 0.0625;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Convert = 0x44,
    WriteScratchpad = 0x4e,
    ReadScratchpad = 0xBE,
    CopyScratchpad = 0x48,
    RecallE2 = 0xB8,
    ReadPowerSupply = 0xB4,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Conversion resolution, stored in bits 5-6 of the configuration register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Resolution {
    Bits9 = 0,
    Bits10 = 1,
    Bits11 = 2,
    #[default]
    Bits12 = 3,
}

impl Resolution {
    pub fn from_config(config: u8) -> Self {
        match (config >> 5) & 0x3 {
            0 => Resolution::Bits9,
            1 => Resolution::Bits10,
            2 => Resolution::Bits11,
            _ => Resolution::Bits12,
        }
    }

    /// Clears the low bits of the temperature register that are undefined
    /// at this resolution
    pub fn mask(&self) -> u16 {
        match self {
            Resolution::Bits9 => 0xFFF8,
            Resolution::Bits10 => 0xFFFC,
            Resolution::Bits11 => 0xFFFE,
            Resolution::Bits12 => 0xFFFF,
        }
    }

    /// Worst-case conversion time from the datasheet, rounded up
    ///
    /// [`Ds18b20::start_conversion`] does not use it and always reports
    /// [`CONVERSION_DELAY_MS`].
    pub fn conversion_time_ms(&self) -> u16 {
        match self {
            Resolution::Bits9 => 94,
            Resolution::Bits10 => 188,
            Resolution::Bits11 => 375,
            Resolution::Bits12 => 750,
        }
    }
}

/// The 9 bytes returned by `Read Scratchpad`, CRC already checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad {
    raw: [u8; Self::BYTES],
}

impl Scratchpad {
    pub const BYTES: usize = 9;

    /// Validates the check byte (byte 8) against bytes 0-7
    pub fn from_bytes<E: Debug>(raw: [u8; Self::BYTES]) -> Result<Self, Error<E>> {
        ensure_correct_crc8::<E>(&raw[..8], raw[8])?;
        Ok(Scratchpad { raw })
    }

    pub fn as_bytes(&self) -> &[u8; Self::BYTES] {
        &self.raw
    }

    /// Temperature register as read, undefined low bits included
    pub fn raw_temperature(&self) -> u16 {
        LittleEndian::read_u16(&self.raw[0..2])
    }

    pub fn alarm_high(&self) -> i8 {
        i8::from_le_bytes([self.raw[2]])
    }

    pub fn alarm_low(&self) -> i8 {
        i8::from_le_bytes([self.raw[3]])
    }

    pub fn config(&self) -> u8 {
        self.raw[4]
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::from_config(self.config())
    }

    /// Temperature register in 1/16 degree, masked to the active resolution
    pub fn masked_temperature(&self) -> i16 {
        let masked = self.raw_temperature() & self.resolution().mask();
        i16::from_le_bytes(masked.to_le_bytes())
    }

    /// Temperature in degrees Celsius
    pub fn temperature(&self) -> f32 {
        f32::from(self.masked_temperature()) * TEMPERATURE_LSB
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ds18b20;

impl Ds18b20 {
    /// Starts a conversion and returns the milliseconds to wait before reading
    ///
    /// On a parasite-powered bus the line is left driven high so the sensor
    /// can draw its conversion current; the next reset releases it.
    pub fn start_conversion<W: IoWire, D: DelayNs>(
        &self,
        driver: &mut Driver<W, D>,
    ) -> Result<u16, Error<W::Error>> {
        driver
            .reset_skip_write_only(&[Command::Convert.op_code()])
            .map_err(|e| failed("run conversion", e))?;
        if driver.power_mode() == PowerMode::Parasite {
            driver.strong_pullup()?;
        }
        Ok(CONVERSION_DELAY_MS)
    }

    pub fn read_scratchpad<W: IoWire, D: DelayNs>(
        &self,
        driver: &mut Driver<W, D>,
    ) -> Result<Scratchpad, Error<W::Error>> {
        let mut raw = [0u8; Scratchpad::BYTES];
        driver
            .reset_skip_write_read(&[Command::ReadScratchpad.op_code()], &mut raw[..])
            .map_err(|e| failed("read temperature", e))?;
        let scratchpad = Scratchpad::from_bytes::<W::Error>(raw)
            .map_err(|e| failed("read temperature", e))?;
        debug!("scratchpad {:02x?}", scratchpad.as_bytes());
        Ok(scratchpad)
    }

    pub fn read_temperature<W: IoWire, D: DelayNs>(
        &self,
        driver: &mut Driver<W, D>,
    ) -> Result<f32, Error<W::Error>> {
        self.read_scratchpad(driver).map(|s| s.temperature())
    }
}

fn failed<E: Debug>(action: &str, error: Error<E>) -> Error<E> {
    warn!("DS18B20: failed to {}, {}", action, error);
    error
}

impl Sensor for Ds18b20 {
    fn start_measurement<W: IoWire, D: DelayNs>(
        &self,
        driver: &mut Driver<W, D>,
    ) -> Result<u16, Error<W::Error>> {
        self.start_conversion(driver)
    }

    fn read_measurement<W: IoWire, D: DelayNs>(
        &self,
        driver: &mut Driver<W, D>,
    ) -> Result<f32, Error<W::Error>> {
        self.read_temperature(driver)
    }

    fn read_measurement_raw<W: IoWire, D: DelayNs>(
        &self,
        driver: &mut Driver<W, D>,
    ) -> Result<u16, Error<W::Error>> {
        let scratchpad = self.read_scratchpad(driver)?;
        Ok(scratchpad.masked_temperature() as u16)
    }
}

/// Split raw value to two parts: integer and fraction N
/// Original value may be calculated as: integer + fraction/10000
pub fn split_temp(temperature: i16) -> (i16, i16) {
    if temperature >= 0 {
        (temperature >> 4, (temperature & 0xF) * 625)
    } else {
        let abs = temperature.unsigned_abs();
        (-((abs >> 4) as i16), -625 * (abs & 0xF) as i16)
    }
}
