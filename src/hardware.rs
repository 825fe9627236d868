use rppal::gpio::{Gpio, InputPin, Level, OutputPin};

use crate::led::Light;

/// Physical side of the device: one button, one relay, one status light.
pub trait Board {
    /// Current raw button level, `true` while held down.
    fn button_pressed(&mut self) -> bool;

    fn set_relay(&mut self, on: bool);

    /// Brightness between 0.0 and 1.0.
    fn set_light(&mut self, level: f32);
}

/// Both the button and the relay are wired active-low.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ActiveLow(pub bool);

impl From<Level> for ActiveLow {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => ActiveLow(true),
            Level::High => ActiveLow(false),
        }
    }
}

impl From<ActiveLow> for Level {
    fn from(active: ActiveLow) -> Self {
        if active.0 {
            Level::Low
        } else {
            Level::High
        }
    }
}

pub struct GpioBoard {
    button: InputPin,
    relay: OutputPin,
    light: Light,
}

impl GpioBoard {
    pub fn new(
        button_pin: u8,
        relay_pin: u8,
        led_pin: u8,
        led_active_low: bool,
    ) -> rppal::gpio::Result<Self> {
        let gpio = Gpio::new()?;
        let button = gpio.get(button_pin)?.into_input_pullup();
        // start with the relay released
        let mut relay = gpio.get(relay_pin)?.into_output();
        relay.write(ActiveLow(false).into());
        let led = gpio.get(led_pin)?.into_output();
        Ok(GpioBoard {
            button,
            relay,
            light: Light::new(led, led_active_low),
        })
    }
}

impl Board for GpioBoard {
    #[inline]
    fn button_pressed(&mut self) -> bool {
        ActiveLow::from(self.button.read()).0
    }

    fn set_relay(&mut self, on: bool) {
        self.relay.write(ActiveLow(on).into());
    }

    fn set_light(&mut self, level: f32) {
        self.light.set(level)
    }
}
