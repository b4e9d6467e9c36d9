use crate::{Driver, Error, IoWire};
use embedded_hal::delay::DelayNs;

pub trait Sensor {
    /// returns the milliseconds required to wait until the measurement finished
    fn start_measurement<W: IoWire, D: DelayNs>(
        &self,
        driver: &mut Driver<W, D>,
    ) -> Result<u16, Error<W::Error>>;

    /// returns the measured value
    fn read_measurement<W: IoWire, D: DelayNs>(
        &self,
        driver: &mut Driver<W, D>,
    ) -> Result<f32, Error<W::Error>>;

    fn read_measurement_raw<W: IoWire, D: DelayNs>(
        &self,
        driver: &mut Driver<W, D>,
    ) -> Result<u16, Error<W::Error>>;
}
