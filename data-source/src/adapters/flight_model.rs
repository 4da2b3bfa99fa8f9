//! Simulated aircraft state driven by the emulator's physics tick.

use std::f64::consts::PI;

use gauge_protocol::VariableKey;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MIN_ALTITUDE: f64 = 1000.0;
const MAX_ALTITUDE: f64 = 10000.0;
const ALTITUDE_STEP: f64 = 2.0;
const MAX_BANK_RADIANS: f64 = PI / 6.0;
const ROLL_SPEED: f64 = 0.001;
const KOHLSMAN_INHG: f64 = 29.92;
/// Seconds of simulated time per step (60 fps)
const STEP_SECONDS: f64 = 1.0 / 60.0;

/// Smoothly oscillating instrument values for one aircraft
pub struct FlightModel {
    rng: StdRng,
    altitude: f64,
    ascending: bool,
    bank_radians: f64,
    rolling_left: bool,
    pitch_time: f64,
    pitch_degrees: f64,
    rpm_time: (f64, f64),
    rpm: (f64, f64),
    vertical_speed_time: f64,
    vertical_speed: f64,
    heading_time: f64,
    heading_degrees: f64,
    ball_time: f64,
    ball_degrees: f64,
    ball_position: f64,
    airspeed_knots: f64,
    airspeed_phase: f64,
    airspeed_range: (f64, f64),
    airspeed_cycle_secs: f64,
    turn_rate_time: f64,
    turn_rate_radians: f64,
    manifold_time: (f64, f64),
    manifold_pressure: (f64, f64),
}

impl FlightModel {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// A model with reproducible noise
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            altitude: MIN_ALTITUDE,
            ascending: true,
            bank_radians: 0.0,
            rolling_left: true,
            pitch_time: 0.0,
            pitch_degrees: 0.0,
            rpm_time: (0.0, 0.0),
            rpm: (0.0, 0.0),
            vertical_speed_time: 0.0,
            vertical_speed: 0.0,
            heading_time: 0.0,
            heading_degrees: 180.0,
            ball_time: 0.0,
            ball_degrees: 0.0,
            ball_position: 0.0,
            airspeed_knots: 0.0,
            airspeed_phase: 0.0,
            airspeed_range: (0.0, 0.0),
            airspeed_cycle_secs: 0.0,
            turn_rate_time: 0.0,
            turn_rate_radians: 0.0,
            manifold_time: (0.0, 0.0),
            manifold_pressure: (0.0, 0.0),
        }
    }

    /// Advance every instrument by one tick
    pub fn step(&mut self) {
        self.step_altitude();
        self.step_roll();

        self.pitch_time += 0.005;
        self.pitch_degrees = self.pitch_time.sin() * 20.0;

        self.step_rpm();

        self.vertical_speed_time += 0.005;
        self.vertical_speed = self.vertical_speed_time.sin() * 33.3333;

        self.heading_time += 0.005;
        // swings between 90 and 270
        self.heading_degrees = 180.0 + self.heading_time.sin() * 90.0;

        self.ball_time += 0.005;
        self.ball_degrees = self.ball_time.sin() * 10.0;
        self.ball_position = self.ball_time.sin();

        self.step_airspeed();

        self.turn_rate_time += 0.01;
        self.turn_rate_radians = self.turn_rate_time.sin() * (3.0 * PI / 180.0);

        self.step_manifold();
    }

    fn step_altitude(&mut self) {
        if self.ascending {
            self.altitude += ALTITUDE_STEP;
            if self.altitude >= MAX_ALTITUDE {
                self.ascending = false;
            }
        } else {
            self.altitude -= ALTITUDE_STEP;
            if self.altitude <= MIN_ALTITUDE {
                self.ascending = true;
            }
        }
    }

    fn step_roll(&mut self) {
        if self.rolling_left {
            self.bank_radians -= ROLL_SPEED;
            if self.bank_radians <= -MAX_BANK_RADIANS {
                self.rolling_left = false;
            }
        } else {
            self.bank_radians += ROLL_SPEED;
            if self.bank_radians >= MAX_BANK_RADIANS {
                self.rolling_left = true;
            }
        }
    }

    fn step_rpm(&mut self) {
        self.rpm_time.0 += 0.01;
        self.rpm_time.1 += 0.0105;

        let (min_left, max_left) = (500.0, 2800.0);
        let (min_right, max_right) = (600.0, 2900.0);

        let left = (max_left + min_left) / 2.0 + (max_left - min_left) / 2.0 * self.rpm_time.0.sin();
        let right =
            (max_right + min_right) / 2.0 + (max_right - min_right) / 2.0 * self.rpm_time.1.sin();

        self.rpm.0 = left + self.rng.random::<f64>() * 10.0 - 5.0;
        self.rpm.1 = right + self.rng.random::<f64>() * 10.0 - 5.0;
    }

    fn step_airspeed(&mut self) {
        if self.airspeed_cycle_secs <= 0.0 || self.airspeed_phase >= 2.0 * PI {
            self.airspeed_range = (
                40.0 + self.rng.random::<f64>() * 20.0,
                120.0 + self.rng.random::<f64>() * 40.0,
            );
            self.airspeed_cycle_secs = 10.0 + self.rng.random::<f64>() * 10.0;
            self.airspeed_phase = 0.0;
        }

        self.airspeed_phase += (2.0 * PI / self.airspeed_cycle_secs) * STEP_SECONDS;

        let wave = (self.airspeed_phase.sin() + 1.0) / 2.0;
        let (min, max) = self.airspeed_range;
        self.airspeed_knots = min + (max - min) * wave;
    }

    fn step_manifold(&mut self) {
        self.manifold_time.0 += 0.001;
        self.manifold_time.1 += 0.0012;

        let (min, max) = (10.0, 35.0);
        let mid = (max + min) / 2.0;
        let amplitude = (max - min) / 2.0;

        let noise_1 = (self.rng.random::<f64>() - 0.5) * 0.1;
        let noise_2 = (self.rng.random::<f64>() - 0.5) * 0.1;

        let target_1 = mid + amplitude * self.manifold_time.0.sin() + noise_1;
        let target_2 = mid + amplitude * (self.manifold_time.1 + 0.3).sin() + noise_2;

        self.manifold_pressure.0 = 0.98 * self.manifold_pressure.0 + 0.02 * target_1;
        self.manifold_pressure.1 = 0.98 * self.manifold_pressure.1 + 0.02 * target_2;
    }

    /// Current value for `key`, converted to its unit where the unit matters.
    ///
    /// Returns `None` for variables the emulator does not simulate.
    pub fn read(&self, key: &VariableKey) -> Option<f64> {
        let radians = key.unit_matches(Some("radians"));

        let value = match key.folded_name() {
            "indicated altitude" => self.altitude,
            "airspeed indicated" => self.airspeed_knots,
            "plane bank degrees" if radians => self.bank_radians,
            "plane bank degrees" => self.bank_radians.to_degrees(),
            "plane pitch degrees" if radians => self.pitch_degrees.to_radians(),
            "plane pitch degrees" => self.pitch_degrees,
            "plane heading degrees true" if radians => self.heading_degrees.to_radians(),
            "plane heading degrees true" => self.heading_degrees,
            "vertical speed" => self.vertical_speed,
            "general eng rpm:1" => self.rpm.0,
            "general eng rpm:2" => self.rpm.1,
            "turn indicator rate" if radians => self.turn_rate_radians,
            "turn indicator rate" => self.turn_rate_radians.to_degrees(),
            "turn coordinator ball" if key.unit_matches(Some("degrees")) => self.ball_degrees,
            "turn coordinator ball" => self.ball_position,
            "kohlsman setting hg:1" => KOHLSMAN_INHG,
            "eng manifold pressure:1" => self.manifold_pressure.0,
            "eng manifold pressure:2" => self.manifold_pressure.1,
            _ => return None,
        };

        Some(value)
    }
}

impl Default for FlightModel {
    fn default() -> Self {
        Self::new()
    }
}
