use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin};

/// Line configuration between slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    /// Released, the external pull-up (or the sensor) sets the level
    FloatingInput,
    /// Actively driven by the master
    PullUpOutput,
}

pub trait IoWire {
    type Error: Error;

    /// Is the line high?
    fn is_high(&mut self) -> Result<bool, Self::Error>;

    /// Is the line low?
    fn is_low(&mut self) -> Result<bool, Self::Error>;

    /// Drives the line low
    ///
    /// *NOTE* only has an effect on the bus while in [`WireMode::PullUpOutput`]
    fn set_low(&mut self) -> Result<(), Self::Error>;

    /// Drives the line high
    ///
    /// *NOTE* the actual electrical state of the line may not actually be high, e.g. due to
    /// an open-drain output stage
    fn set_high(&mut self) -> Result<(), Self::Error>;

    /// Switches the line between released input and driven output
    fn set_mode(&mut self, mode: WireMode) -> Result<(), Self::Error>;
}

/// Single open-drain line config wrapper
///
/// Releasing the line means letting the output float high, so
/// [`WireMode::FloatingInput`] writes a high level and
/// [`WireMode::PullUpOutput`] leaves the pin untouched.
impl<IO> IoWire for (IO,)
where
    IO: ErrorType + OutputPin + InputPin,
{
    type Error = IO::Error;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_mode(&mut self, mode: WireMode) -> Result<(), Self::Error> {
        match mode {
            WireMode::FloatingInput => self.0.set_high(),
            WireMode::PullUpOutput => Ok(()),
        }
    }
}

/// Dual line config wrapper
impl<E, I, O> IoWire for (I, O)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
{
    type Error = E;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.1.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }

    fn set_mode(&mut self, mode: WireMode) -> Result<(), Self::Error> {
        match mode {
            WireMode::FloatingInput => self.1.set_high(),
            WireMode::PullUpOutput => Ok(()),
        }
    }
}
