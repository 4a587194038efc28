//! Raspberry Pi pin setup through `rppal`
//!
//! The limit switch inputs only need their pull resistors configured here;
//! edges are watched through sysfs. The pins are kept in [`SwitchPulls`] so
//! `rppal` does not reset them while the service runs.

use rppal::gpio::{Gpio, InputPin, Level};
use tracing::info;

use super::PinId;
use crate::motor::MotorDriver;

pub struct SwitchPulls {
    _pins: Vec<InputPin>,
}

/// Configures each switch pin as an input with the requested pull resistor.
pub fn configure_switches(gpio: &Gpio, pins: &[PinId], pull_up: bool) -> Result<SwitchPulls, rppal::gpio::Error> {
    let mut held = Vec::with_capacity(pins.len());
    for &pin in pins {
        let input = if pull_up {
            gpio.get(pin)?.into_input_pullup()
        } else {
            gpio.get(pin)?.into_input_pulldown()
        };
        info!("gpio {} configured as input (pull_up={})", pin, pull_up);
        held.push(input);
    }
    Ok(SwitchPulls { _pins: held })
}

/// Claims both bridge terminals as outputs and parks the motor.
pub fn open_motor(gpio: &Gpio, left: PinId, right: PinId, active: Level) -> Result<MotorDriver, rppal::gpio::Error> {
    let left_pin = gpio.get(left)?.into_output();
    let right_pin = gpio.get(right)?.into_output();
    info!("Motor bridge on gpio {} / {} (active {:?})", left, right, active);
    Ok(MotorDriver::new(Box::new(left_pin), Box::new(right_pin), active))
}
