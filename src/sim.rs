//! Simulated single-wire bus for unit tests.
//!
//! The line is modelled from the master's point of view: it is low while the
//! master drives it low, low during a presence pulse, low when the sensor
//! answers a read slot with a 0 bit, and high otherwise. Low pulses are
//! classified by their duration, using the simulated clock advanced by
//! [`SimDelay`]: >= 480 us is a reset, >= 15 us a written 0, anything shorter
//! opens a slot that is either a written 1 or, if the master samples it, a
//! read slot. The sensor holds a 0 bit only for the first 15 us of a read
//! slot, so a late sample reads 1.

use crate::WireMode;
use core::convert::Infallible;
use embedded_hal::delay::DelayNs;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

const RESET_MIN_US: u64 = 480;
const WRITE_0_MIN_US: u64 = 15;
const READ_VALID_US: u64 = 15;

/// 25.0625 degrees, 12-bit resolution
pub const SCRATCHPAD_25C: [u8; 9] = [0x91, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x0F, 0x10, 0x25];

struct State {
    now_ns: u64,
    mode: WireMode,
    latch_high: bool,
    low_since: Option<u64>,
    released_at: u64,
    short_slot: bool,

    scratchpad: Option<[u8; 9]>,
    presence_armed: bool,
    frame: Vec<u8>,
    frame_bits: Vec<bool>,
    read_queue: VecDeque<bool>,

    written: Vec<bool>,
    low_pulses: Vec<u64>,
    falling_edges: Vec<u64>,
    rising_edges: Vec<u64>,
    sample_offsets: Vec<u64>,
    resets: usize,
    conversions: usize,
}

impl State {
    fn driven_low(&self) -> bool {
        self.mode == WireMode::PullUpOutput && !self.latch_high
    }

    fn update(&mut self) {
        match (self.low_since, self.driven_low()) {
            (None, true) => {
                self.finish_slot();
                self.presence_armed = false;
                self.low_since = Some(self.now_ns);
                self.falling_edges.push(self.now_ns / 1_000);
            }
            (Some(start), false) => {
                self.low_since = None;
                self.released_at = self.now_ns;
                let width = (self.now_ns - start) / 1_000;
                self.low_pulses.push(width);
                self.rising_edges.push(self.now_ns / 1_000);
                if width >= RESET_MIN_US {
                    self.on_reset();
                } else if width >= WRITE_0_MIN_US {
                    self.on_bit(false);
                } else {
                    self.short_slot = true;
                }
            }
            _ => {}
        }
    }

    fn finish_slot(&mut self) {
        if self.short_slot {
            self.short_slot = false;
            self.on_bit(true);
        }
    }

    fn on_reset(&mut self) {
        self.resets += 1;
        self.frame.clear();
        self.frame_bits.clear();
        self.read_queue.clear();
        self.presence_armed = self.scratchpad.is_some();
    }

    fn on_bit(&mut self, bit: bool) {
        self.written.push(bit);
        self.frame_bits.push(bit);
        if self.frame_bits.len() == 8 {
            let byte = pack(&self.frame_bits);
            self.frame_bits.clear();
            self.on_byte(byte);
        }
    }

    fn on_byte(&mut self, byte: u8) {
        self.frame.push(byte);
        let Some(scratchpad) = self.scratchpad else {
            return;
        };
        match self.frame.as_slice() {
            [0xCC, 0x44] => self.conversions += 1,
            [0xCC, 0xBE] => {
                for byte in scratchpad {
                    self.read_queue.extend((0..8).map(|i| byte & (1 << i) != 0));
                }
            }
            _ => {}
        }
    }

    fn sample(&mut self) -> bool {
        if self.low_since.is_some() {
            return false;
        }
        if self.short_slot {
            self.short_slot = false;
            let offset = self.now_ns / 1_000 - self.falling_edges.last().copied().unwrap_or(0);
            self.sample_offsets.push(offset);
            let bit = self.read_queue.pop_front().unwrap_or(true);
            return bit || offset > READ_VALID_US;
        }
        let since_release = (self.now_ns - self.released_at) / 1_000;
        !(self.presence_armed && (15..=240).contains(&since_release))
    }
}

fn pack(bits: &[bool]) -> u8 {
    bits.iter()
        .enumerate()
        .fold(0, |byte, (i, bit)| byte | ((*bit as u8) << i))
}

/// Handle to the shared bus state
#[derive(Clone)]
pub struct SimBus(Rc<RefCell<State>>);

impl SimBus {
    fn new(scratchpad: Option<[u8; 9]>) -> Self {
        SimBus(Rc::new(RefCell::new(State {
            now_ns: 0,
            mode: WireMode::FloatingInput,
            latch_high: false,
            low_since: None,
            released_at: 0,
            short_slot: false,
            scratchpad,
            presence_armed: false,
            frame: Vec::new(),
            frame_bits: Vec::new(),
            read_queue: VecDeque::new(),
            written: Vec::new(),
            low_pulses: Vec::new(),
            falling_edges: Vec::new(),
            rising_edges: Vec::new(),
            sample_offsets: Vec::new(),
            resets: 0,
            conversions: 0,
        })))
    }

    /// Bus with one sensor holding [`SCRATCHPAD_25C`]
    pub fn with_sensor() -> Self {
        Self::new(Some(SCRATCHPAD_25C))
    }

    /// Bus with one sensor holding the given scratchpad, CRC byte included
    pub fn with_scratchpad(scratchpad: [u8; 9]) -> Self {
        Self::new(Some(scratchpad))
    }

    /// Bus with nothing but the pull-up resistor
    pub fn empty() -> Self {
        Self::new(None)
    }

    pub fn endpoints(&self) -> (SimWire, SimDelay) {
        (SimWire(self.clone()), SimDelay(self.clone()))
    }

    pub fn queue_read_bits(&self, bits: &[bool]) {
        self.0.borrow_mut().read_queue.extend(bits.iter().copied());
    }

    pub fn queue_read_bytes(&self, bytes: &[u8]) {
        let mut state = self.0.borrow_mut();
        for byte in bytes {
            state.read_queue.extend((0..8).map(|i| byte & (1 << i) != 0));
        }
    }

    /// Every bit written by the master, in wire order
    pub fn written_bits(&self) -> Vec<bool> {
        let state = self.0.borrow();
        let mut bits = state.written.clone();
        if state.short_slot {
            bits.push(true);
        }
        bits
    }

    pub fn written_bytes(&self) -> Vec<u8> {
        self.written_bits().chunks(8).map(pack).collect()
    }

    /// Widths of the low pulses driven by the master, in us
    pub fn low_pulses(&self) -> Vec<u64> {
        self.0.borrow().low_pulses.clone()
    }

    /// Time from each slot's falling edge to the master's read sample, in us
    pub fn sample_offsets(&self) -> Vec<u64> {
        self.0.borrow().sample_offsets.clone()
    }

    /// Time between consecutive falling edges, in us
    pub fn slot_periods(&self) -> Vec<u64> {
        let state = self.0.borrow();
        state.falling_edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Time the line stays released before the next falling edge, in us
    pub fn recovery_gaps(&self) -> Vec<u64> {
        let state = self.0.borrow();
        state
            .rising_edges
            .iter()
            .zip(state.falling_edges.iter().skip(1))
            .map(|(rise, fall)| fall - rise)
            .collect()
    }

    pub fn elapsed_us(&self) -> u64 {
        self.0.borrow().now_ns / 1_000
    }

    pub fn resets(&self) -> usize {
        self.0.borrow().resets
    }

    pub fn conversions(&self) -> usize {
        self.0.borrow().conversions
    }

    /// Is the master actively driving the line high?
    pub fn strong_pullup(&self) -> bool {
        let state = self.0.borrow();
        state.mode == WireMode::PullUpOutput && state.latch_high
    }
}

pub struct SimWire(SimBus);

impl SimWire {
    pub fn mode(&self) -> WireMode {
        (self.0).0.borrow().mode
    }

    fn with<T>(&mut self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = (self.0).0.borrow_mut();
        f(&mut *state)
    }
}

impl crate::IoWire for SimWire {
    type Error = Infallible;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.with(State::sample))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.with(State::sample))
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.with(|state| {
            state.latch_high = false;
            state.update();
        });
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.with(|state| {
            state.latch_high = true;
            state.update();
        });
        Ok(())
    }

    fn set_mode(&mut self, mode: WireMode) -> Result<(), Self::Error> {
        self.with(|state| {
            state.mode = mode;
            state.update();
        });
        Ok(())
    }
}

/// Advances the simulated clock instead of sleeping
pub struct SimDelay(SimBus);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        (self.0).0.borrow_mut().now_ns += u64::from(ns);
    }
}

/// Logger keeping the records of the current test thread
struct CaptureLogger;

std::thread_local! {
    static RECORDS: RefCell<Vec<(log::Level, std::string::String)>> = RefCell::new(Vec::new());
}

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = std::format!("{}", record.args());
        RECORDS.with(|records| records.borrow_mut().push((record.level(), line)));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static LOGGER_INIT: std::sync::Once = std::sync::Once::new();

/// Runs `f` and returns the `warn!` messages it emitted
pub fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<std::string::String>) {
    LOGGER_INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    });
    RECORDS.with(|records| records.borrow_mut().clear());
    let result = f();
    let warnings: Vec<_> = RECORDS.with(|records| {
        records
            .borrow_mut()
            .drain(..)
            .filter(|(level, _)| *level == log::Level::Warn)
            .map(|(_, line)| line)
            .collect()
    });
    (result, warnings)
}
