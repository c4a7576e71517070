use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::core::{Env, GymError, Info, RenderFrame, Result, Step};
use crate::envs::atc::sim::SimContext;
use crate::registry::KwArgs;
use crate::spaces::{BoxBounds, BoxSpace, HasSpaces};
use crate::utils::rng::{rng_from_seed, RngStream};

const CALLSIGN: &str = "KL001";
const ACTYPE: &str = "A320";
/// Full-scale action maps to this vertical speed.
const MAX_RATE_FPM: f32 = 2500.0;
/// Rate used to recapture the current altitude on a zero action.
const HOLD_RATE_FPM: f32 = 250.0;
const CEILING_FT: f32 = 45_000.0;

/// Tunables for `VerticalControlEnv`. Every field can be overridden through
/// registry kwargs of the same name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerticalControlConfig {
    /// Simulation timestep in seconds.
    pub dt: f32,
    pub initial_altitude_m: f32,
    pub airspeed_mps: f32,
    /// Along-track distance from the spawn point to the runway threshold.
    pub runway_distance_km: f32,
    /// Half-width of the uniform perturbation applied to the initial altitude.
    pub altitude_jitter_m: f32,
    pub max_vertical_accel_mps2: f32,
}

impl Default for VerticalControlConfig {
    fn default() -> Self {
        Self {
            dt: 1.0,
            initial_altitude_m: 3000.0,
            airspeed_mps: 150.0,
            runway_distance_km: 200.0,
            altitude_jitter_m: 0.0,
            max_vertical_accel_mps2: 2.0,
        }
    }
}

impl VerticalControlConfig {
    /// Build a config from stringly kwargs, starting from the defaults.
    pub fn from_kwargs(kwargs: &KwArgs) -> Result<Self> {
        let mut cfg = Self::default();
        for (key, raw) in kwargs {
            let slot = match key.as_str() {
                "dt" => &mut cfg.dt,
                "initial_altitude_m" => &mut cfg.initial_altitude_m,
                "airspeed_mps" => &mut cfg.airspeed_mps,
                "runway_distance_km" => &mut cfg.runway_distance_km,
                "altitude_jitter_m" => &mut cfg.altitude_jitter_m,
                "max_vertical_accel_mps2" => &mut cfg.max_vertical_accel_mps2,
                other => return Err(GymError::InvalidArgument(format!("unknown kwarg `{other}`"))),
            };
            *slot = raw
                .trim()
                .parse()
                .map_err(|e| GymError::InvalidArgument(format!("kwarg `{key}`={raw:?}: {e}")))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("dt", self.dt),
            ("initial_altitude_m", self.initial_altitude_m),
            ("airspeed_mps", self.airspeed_mps),
            ("runway_distance_km", self.runway_distance_km),
            ("altitude_jitter_m", self.altitude_jitter_m),
            ("max_vertical_accel_mps2", self.max_vertical_accel_mps2),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(GymError::InvalidArgument(format!("{name} must be finite, got {value}")));
        }
        if self.dt <= 0.0 {
            return Err(GymError::InvalidArgument(format!("dt must be positive, got {}", self.dt)));
        }
        if self.altitude_jitter_m < 0.0 {
            return Err(GymError::InvalidArgument("altitude_jitter_m must be non-negative".into()));
        }
        if self.max_vertical_accel_mps2 <= 0.0 {
            return Err(GymError::InvalidArgument("max_vertical_accel_mps2 must be positive".into()));
        }
        Ok(())
    }
}

/// Single-aircraft vertical-control task.
///
/// Observation: `[(alt - 1500) / 3000, vs / 5, (dis - 100) / 200]` with the
/// altitude in metres, vertical speed in m/s and `dis` the remaining distance
/// to the runway in km.
/// Action: `Box([-1.0], [1.0])`, scaled to a vertical speed of up to 2500 fpm.
/// A positive rate climbs toward 45000 ft, a negative one descends toward the
/// ground, and an exactly zero action holds the current altitude.
/// Reward: `-5 * |3000 - alt| / 3000` while airborne and short of the runway;
/// `-100` and termination when the altitude reaches zero;
/// `-50 * |100 - alt| / 3000` and termination at the runway.
pub struct VerticalControlEnv {
    config: VerticalControlConfig,
    sim: SimContext,
    rng: RngStream,
    action_space: BoxSpace<f32, 1>,
    observation_space: BoxSpace<f32, 3>,
}

impl VerticalControlEnv {
    pub fn new(config: VerticalControlConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut sim = SimContext::new(config.dt, config.max_vertical_accel_mps2)?;
        sim.create(CALLSIGN, ACTYPE, config.initial_altitude_m, config.airspeed_mps);
        Ok(Self {
            sim,
            rng: rng_from_seed(seed),
            action_space: BoxSpace::new([-1.0], [1.0]),
            observation_space: BoxSpace::new([f32::NEG_INFINITY; 3], [f32::INFINITY; 3]),
            config,
        })
    }

    pub fn config(&self) -> &VerticalControlConfig { &self.config }

    pub fn sim(&self) -> &SimContext { &self.sim }

    /// Remaining distance to the runway in km.
    fn distance_to_runway_km(&self) -> f32 {
        let flown = self.sim.aircraft(0).map_or(0.0, |ac| ac.distance_flown_km);
        self.config.runway_distance_km - flown
    }

    fn state(&self) -> [f32; 3] {
        let (alt, vs) = self.sim.aircraft(0).map_or((0.0, 0.0), |ac| (ac.alt_m, ac.vs_mps));
        let dis = self.distance_to_runway_km();
        [(alt - 1500.0) / 3000.0, vs / 5.0, (dis - 100.0) / 200.0]
    }

    /// Reward and termination flag for a normalized state.
    pub fn reward(state: &[f32; 3]) -> (f32, bool) {
        let alt = state[0] * 3000.0 + 1500.0;
        let dis = state[2] * 200.0 + 100.0;
        if dis > 0.0 && alt > 0.0 {
            ((3000.0 - alt).abs() * -5.0 / 3000.0, false)
        } else if alt <= 0.0 {
            (-100.0, true)
        } else {
            ((100.0 - alt).abs() * -50.0 / 3000.0, true)
        }
    }

    fn apply_action(&mut self, action: f32) {
        let fpm = action * MAX_RATE_FPM;
        if fpm > 0.0 {
            self.sim.clear_altitude(0, CEILING_FT, fpm);
        } else if fpm < 0.0 {
            self.sim.clear_altitude(0, 0.0, -fpm);
        } else {
            self.sim.hold_altitude(0, HOLD_RATE_FPM);
        }
    }
}

impl Env for VerticalControlEnv {
    type Obs = [f32; 3];
    type Act = [f32; 1];

    fn reset(&mut self, seed: Option<u64>) -> (Self::Obs, Info) {
        if let Some(s) = seed { self.rng = rng_from_seed(s); }
        let jitter = self.config.altitude_jitter_m;
        let alt = if jitter > 0.0 {
            self.config.initial_altitude_m + Uniform::new_inclusive(-jitter, jitter).sample(&mut self.rng)
        } else {
            self.config.initial_altitude_m
        };
        self.sim.delete_all();
        self.sim.create(CALLSIGN, ACTYPE, alt, self.config.airspeed_mps);
        (self.state(), Info::new())
    }

    fn step(&mut self, action: Self::Act) -> Step<Self::Obs> {
        let [a] = self.action_space.clip(action);
        self.apply_action(a);
        self.sim.step();
        let state = self.state();
        let (reward, terminated) = Self::reward(&state);
        Step::new(state, reward, terminated, false, Info::new())
    }

    fn render(&self) -> Option<RenderFrame> {
        let ac = self.sim.aircraft(0)?;
        Some(RenderFrame::Text(format!(
            "t={:.0}s {} alt={:.1}m vs={:.2}m/s dis={:.2}km",
            self.sim.sim_time_s(),
            ac.callsign,
            ac.alt_m,
            ac.vs_mps,
            self.distance_to_runway_km()
        )))
    }

    fn close(&mut self) { self.sim.quit(); }
}

impl HasSpaces for VerticalControlEnv {
    fn observation_space(&self) -> BoxBounds { BoxBounds::from(&self.observation_space) }
    fn action_space(&self) -> BoxBounds { BoxBounds::from(&self.action_space) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_env() -> VerticalControlEnv {
        VerticalControlEnv::new(VerticalControlConfig::default(), 0).unwrap()
    }

    fn kwargs(pairs: &[(&str, &str)]) -> KwArgs {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn reset_places_aircraft_at_initial_state() {
        let mut env = default_env();
        let (obs, info) = env.reset(Some(0));
        assert!(info.is_empty());
        assert!((obs[0] - 0.5).abs() < 1e-6);
        assert_eq!(obs[1], 0.0);
        assert!((obs[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn neutral_action_holds_altitude_with_small_penalty() {
        let mut env = default_env();
        env.reset(Some(0));
        let s = env.step([0.0]);
        assert!(!s.done());
        assert!((s.observation[0] - 0.5).abs() < 1e-5);
        assert!(s.reward.abs() < 1e-4);
    }

    #[test]
    fn descending_costs_reward() {
        let mut env = default_env();
        env.reset(Some(0));
        let mut last = env.step([-1.0]);
        for _ in 0..20 { last = env.step([-1.0]); }
        assert!(last.observation[1] < 0.0);
        assert!(last.reward < 0.0);
    }

    #[test]
    fn reward_rules_match_each_regime() {
        // airborne, short of the runway, at 3000 m
        let (r, done) = VerticalControlEnv::reward(&[0.5, 0.0, 0.5]);
        assert!(r.abs() < 1e-6 && !done);
        // altitude at zero
        let (r, done) = VerticalControlEnv::reward(&[-0.5, 0.0, 0.5]);
        assert_eq!(r, -100.0);
        assert!(done);
        // over the runway at 100 m
        let (r, done) = VerticalControlEnv::reward(&[(100.0 - 1500.0) / 3000.0, 0.0, -0.5]);
        assert!(r.abs() < 1e-3);
        assert!(done);
    }

    #[test]
    fn reaching_the_runway_terminates() {
        let cfg = VerticalControlConfig { runway_distance_km: 0.5, ..Default::default() };
        let mut env = VerticalControlEnv::new(cfg, 0).unwrap();
        env.reset(None);
        let mut steps = 0;
        loop {
            steps += 1;
            let s = env.step([0.0]);
            if s.terminated { break; }
            assert!(steps < 10);
        }
        // 0.15 km per step
        assert_eq!(steps, 4);
    }

    #[test]
    fn actions_are_clipped() {
        let mut a = default_env();
        let mut b = default_env();
        a.reset(Some(1));
        b.reset(Some(1));
        for _ in 0..5 {
            assert_eq!(a.step([5.0]).observation, b.step([1.0]).observation);
        }
    }

    #[test]
    fn jitter_is_seeded() {
        let cfg = VerticalControlConfig { altitude_jitter_m: 200.0, ..Default::default() };
        let mut a = VerticalControlEnv::new(cfg.clone(), 0).unwrap();
        let mut b = VerticalControlEnv::new(cfg, 0).unwrap();
        let (oa, _) = a.reset(Some(11));
        let (ob, _) = b.reset(Some(11));
        assert_eq!(oa, ob);
        let (oc, _) = b.reset(Some(12));
        assert_ne!(oa, oc);
    }

    #[test]
    fn kwargs_parse_and_reject() {
        let cfg = VerticalControlConfig::from_kwargs(&kwargs(&[("runway_distance_km", "12.5"), ("dt", "0.5")])).unwrap();
        assert_eq!(cfg.runway_distance_km, 12.5);
        assert_eq!(cfg.dt, 0.5);
        assert!(matches!(
            VerticalControlConfig::from_kwargs(&kwargs(&[("wind", "3")])),
            Err(GymError::InvalidArgument(_))
        ));
        assert!(matches!(
            VerticalControlConfig::from_kwargs(&kwargs(&[("dt", "fast")])),
            Err(GymError::InvalidArgument(_))
        ));
        assert!(VerticalControlConfig::from_kwargs(&kwargs(&[("dt", "0")])).is_err());
    }

    #[test]
    fn render_reports_state_and_close_clears_traffic() {
        let mut env = default_env();
        env.reset(None);
        assert!(matches!(env.render(), Some(RenderFrame::Text(t)) if t.contains("KL001")));
        env.close();
        assert!(env.sim().is_empty());
        assert!(env.render().is_none());
    }

    #[test]
    fn spaces_are_advertised() {
        let env = default_env();
        assert_eq!(env.action_space(), BoxBounds::new(vec![-1.0], vec![1.0]));
        assert_eq!(env.observation_space().dim(), 3);
        assert!(!env.observation_space().is_bounded());
    }

    #[test]
    fn non_finite_kwargs_are_rejected() {
        for key in ["dt", "initial_altitude_m", "airspeed_mps", "runway_distance_km", "altitude_jitter_m", "max_vertical_accel_mps2"] {
            for raw in ["inf", "-inf", "NaN"] {
                assert!(
                    matches!(VerticalControlConfig::from_kwargs(&kwargs(&[(key, raw)])), Err(GymError::InvalidArgument(_))),
                    "{key}={raw}"
                );
            }
        }
    }

    #[test]
    fn constructor_validates_its_config() {
        let cfg = VerticalControlConfig { dt: 0.0, ..Default::default() };
        assert!(matches!(VerticalControlEnv::new(cfg, 0), Err(GymError::InvalidArgument(_))));
        let cfg = VerticalControlConfig { altitude_jitter_m: f32::INFINITY, ..Default::default() };
        assert!(VerticalControlEnv::new(cfg, 0).is_err());
    }

    #[test]
    fn small_actions_still_change_altitude() {
        let mut climb = default_env();
        let mut descend = default_env();
        climb.reset(Some(0));
        descend.reset(Some(0));
        // 0.05 * 2500 = 125 fpm
        for _ in 0..5 {
            climb.step([0.05]);
            descend.step([-0.05]);
        }
        let up = climb.step([0.05]).observation;
        let down = descend.step([-0.05]).observation;
        assert!(up[1] > 0.0 && up[0] > 0.5);
        assert!(down[1] < 0.0 && down[0] < 0.5);
        assert!((up[1] * 5.0 - 125.0 * crate::envs::atc::sim::FPM).abs() < 1e-4);
    }
}
