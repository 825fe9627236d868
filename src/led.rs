use log::debug;
use rppal::gpio::OutputPin;

const PWM_FREQUENCY_HZ: f64 = 200.0;
const LIGHT_STEPS: f32 = 32.0;

/// Status LED driven with software PWM. Only writes when the quantized
/// brightness changes.
pub struct Light {
    pin: OutputPin,
    active_low: bool,
    step: Option<u8>,
}

impl Light {
    pub fn new(pin: OutputPin, active_low: bool) -> Self {
        Light {
            pin,
            active_low,
            step: None,
        }
    }

    pub fn set(&mut self, level: f32) {
        let step = quantize(level);
        if self.step == Some(step) {
            return;
        }
        self.step = Some(step);

        let duty = f64::from(step) / f64::from(LIGHT_STEPS);
        let duty = if self.active_low { 1.0 - duty } else { duty };
        if duty <= 0.0 || duty >= 1.0 {
            // ignore errors here, the light is cosmetic
            let _ = self.pin.clear_pwm();
            if duty >= 1.0 {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
        } else if let Err(err) = self.pin.set_pwm_frequency(PWM_FREQUENCY_HZ, duty) {
            debug!("unable to set light PWM: {}", err);
        }
    }
}

fn quantize(level: f32) -> u8 {
    (level.max(0.0).min(1.0) * LIGHT_STEPS).round() as u8
}
