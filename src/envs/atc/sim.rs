//! Point-mass traffic simulation backing the vertical-control environment.
//!
//! All simulator state lives in a `SimContext` value owned by one environment
//! instance, so several environments in the same process never interfere.

use crate::core::{GymError, Result};

/// Feet to metres.
pub const FT: f32 = 0.3048;
/// Feet per minute to metres per second.
pub const FPM: f32 = FT / 60.0;

/// Altitude clearance currently flown by the autopilot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AltitudeClearance {
    /// Target altitude in metres.
    pub target_alt_m: f32,
    /// Vertical speed magnitude used to reach the target, in m/s.
    pub rate_mps: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Aircraft {
    pub callsign: String,
    pub actype: String,
    /// Altitude in metres.
    pub alt_m: f32,
    /// Vertical speed in m/s, positive when climbing.
    pub vs_mps: f32,
    /// Ground speed along track in m/s.
    pub airspeed_mps: f32,
    /// Distance flown along track since creation, in km.
    pub distance_flown_km: f32,
    pub clearance: AltitudeClearance,
}

impl Aircraft {
    fn advance(&mut self, dt: f32, max_vertical_accel: f32) {
        let remaining = self.clearance.target_alt_m - self.alt_m;
        let desired_vs = if remaining.abs() <= f32::EPSILON {
            0.0
        } else {
            // never command more than what reaches the target within one step
            remaining.signum() * self.clearance.rate_mps.min(remaining.abs() / dt)
        };
        let max_dv = max_vertical_accel * dt;
        self.vs_mps += (desired_vs - self.vs_mps).clamp(-max_dv, max_dv);
        self.alt_m += self.vs_mps * dt;
        self.distance_flown_km += self.airspeed_mps * dt / 1000.0;
    }
}

/// Simulation state for a single environment.
#[derive(Clone, Debug)]
pub struct SimContext {
    dt: f32,
    max_vertical_accel: f32,
    sim_time_s: f64,
    traffic: Vec<Aircraft>,
}

impl SimContext {
    pub fn new(dt: f32, max_vertical_accel: f32) -> Result<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(GymError::InvalidArgument(format!("simulation timestep must be positive, got {dt}")));
        }
        if !(max_vertical_accel.is_finite() && max_vertical_accel > 0.0) {
            return Err(GymError::InvalidArgument(format!(
                "vertical acceleration limit must be positive, got {max_vertical_accel}"
            )));
        }
        Ok(Self { dt, max_vertical_accel, sim_time_s: 0.0, traffic: Vec::new() })
    }

    pub fn dt(&self) -> f32 { self.dt }

    pub fn sim_time_s(&self) -> f64 { self.sim_time_s }

    /// Create an aircraft in level flight and return its index.
    pub fn create(&mut self, callsign: &str, actype: &str, alt_m: f32, airspeed_mps: f32) -> usize {
        self.traffic.push(Aircraft {
            callsign: callsign.to_string(),
            actype: actype.to_string(),
            alt_m,
            vs_mps: 0.0,
            airspeed_mps,
            distance_flown_km: 0.0,
            clearance: AltitudeClearance { target_alt_m: alt_m, rate_mps: 0.0 },
        });
        self.traffic.len() - 1
    }

    /// Remove every aircraft.
    pub fn delete_all(&mut self) {
        self.traffic.clear();
    }

    /// Drop all traffic and rewind the clock.
    pub fn quit(&mut self) {
        self.traffic.clear();
        self.sim_time_s = 0.0;
    }

    pub fn aircraft(&self, idx: usize) -> Option<&Aircraft> { self.traffic.get(idx) }

    pub fn len(&self) -> usize { self.traffic.len() }

    pub fn is_empty(&self) -> bool { self.traffic.is_empty() }

    /// Clear aircraft `idx` to `target_ft`, climbing or descending at `rate_fpm`.
    /// Returns false when no such aircraft exists.
    pub fn clear_altitude(&mut self, idx: usize, target_ft: f32, rate_fpm: f32) -> bool {
        match self.traffic.get_mut(idx) {
            Some(ac) => {
                ac.clearance = AltitudeClearance { target_alt_m: target_ft * FT, rate_mps: rate_fpm.abs() * FPM };
                true
            }
            None => false,
        }
    }

    /// Hold the current altitude of aircraft `idx`.
    pub fn hold_altitude(&mut self, idx: usize, rate_fpm: f32) -> bool {
        match self.traffic.get_mut(idx) {
            Some(ac) => {
                ac.clearance = AltitudeClearance { target_alt_m: ac.alt_m, rate_mps: rate_fpm.abs() * FPM };
                true
            }
            None => false,
        }
    }

    /// Advance the simulation by one timestep.
    pub fn step(&mut self) {
        for ac in &mut self.traffic {
            ac.advance(self.dt, self.max_vertical_accel);
        }
        self.sim_time_s += self.dt as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_flight_keeps_altitude_and_moves_along_track() {
        let mut sim = SimContext::new(1.0, 2.0).unwrap();
        let idx = sim.create("KL001", "A320", 3000.0, 150.0);
        for _ in 0..10 { sim.step(); }
        let ac = sim.aircraft(idx).unwrap();
        assert!((ac.alt_m - 3000.0).abs() < 1e-3);
        assert!((ac.distance_flown_km - 1.5).abs() < 1e-4);
        assert!((sim.sim_time_s() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn climb_clearance_accelerates_up_to_rate() {
        let mut sim = SimContext::new(1.0, 2.0).unwrap();
        let idx = sim.create("KL001", "A320", 3000.0, 150.0);
        assert!(sim.clear_altitude(idx, 45_000.0, 2500.0));
        sim.step();
        assert!((sim.aircraft(idx).unwrap().vs_mps - 2.0).abs() < 1e-4);
        for _ in 0..20 { sim.step(); }
        let ac = sim.aircraft(idx).unwrap();
        assert!((ac.vs_mps - 2500.0 * FPM).abs() < 1e-3);
        assert!(ac.alt_m > 3000.0);
    }

    #[test]
    fn clearance_does_not_overshoot_target() {
        let mut sim = SimContext::new(1.0, 100.0).unwrap();
        let idx = sim.create("KL001", "A320", 100.0, 150.0);
        sim.clear_altitude(idx, 0.0, 6000.0);
        for _ in 0..50 { sim.step(); }
        let ac = sim.aircraft(idx).unwrap();
        assert!(ac.alt_m >= -1e-3);
        assert!(ac.alt_m.abs() < 1.0);
    }

    #[test]
    fn commands_on_missing_aircraft_are_rejected() {
        let mut sim = SimContext::new(1.0, 2.0).unwrap();
        assert!(!sim.clear_altitude(0, 1000.0, 500.0));
        assert!(!sim.hold_altitude(0, 250.0));
        sim.create("KL001", "A320", 3000.0, 150.0);
        sim.quit();
        assert!(sim.is_empty());
        assert_eq!(sim.sim_time_s(), 0.0);
    }

    #[test]
    fn invalid_timestep_or_acceleration_is_rejected() {
        for (dt, accel) in [(0.0, 2.0), (-1.0, 2.0), (f32::NAN, 2.0), (f32::INFINITY, 2.0), (1.0, 0.0), (1.0, f32::NAN)] {
            assert!(matches!(SimContext::new(dt, accel), Err(GymError::InvalidArgument(_))), "dt={dt} accel={accel}");
        }
    }
}
