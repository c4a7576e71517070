pub mod core;
pub mod spaces;
pub mod utils;
pub mod envs;
pub mod wrappers;
pub mod registry;
pub mod vector;

pub use crate::core::{Env, GymError, Info, InfoValue, RenderFrame, Result, Step};
pub use crate::spaces::{BoxBounds, BoxSpace, HasSpaces, Space};
pub use crate::envs::{VerticalControlConfig, VerticalControlEnv};
pub use crate::wrappers::{RecordEpisodeStatistics, TimeLimit};
pub use crate::registry::{EnvDyn, EnvSpec, KwArgs, VERTICAL_CONTROL_ID, make, register, register_builtin};
pub use crate::vector::{
    EnvThunk, StepBatch, SubprocVecEnv, SyncVectorEnv, VecEnv, VecEnvConfig, VecEnvError, WorkerCommand, make_env,
    make_vec_env,
};

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// A tiny dummy environment to validate the trait compiles and basic methods work.
    struct CounterEnv {
        state: i32,
    }

    impl Env for CounterEnv {
        type Obs = i32;
        type Act = i32;

        fn reset(&mut self, _seed: Option<u64>) -> (Self::Obs, Info) {
            self.state = 0;
            (self.state, Info::new())
        }

        fn step(&mut self, action: Self::Act) -> Step<Self::Obs> {
            self.state += action;
            let terminated = self.state >= 3;
            Step::new(self.state, 1.0, terminated, false, Info::new())
        }

        fn render(&self) -> Option<RenderFrame> {
            Some(RenderFrame::Text(format!("state={}", self.state)))
        }
    }

    #[test]
    fn dummy_env_runs() {
        let mut env = CounterEnv { state: 0 };
        let (_obs, _info) = env.reset(None);
        let s1 = env.step(1);
        assert_eq!(s1.observation, 1);
        assert!(!s1.terminated);
        let s2 = env.step(2);
        assert_eq!(s2.observation, 3);
        assert!(s2.done());
        assert!(matches!(env.render(), Some(RenderFrame::Text(_))));
        env.close();
    }

    #[test]
    fn action_space_samples_are_valid_actions() {
        let mut rng = StdRng::seed_from_u64(42);
        let env = VerticalControlEnv::new(Default::default(), 0).unwrap();
        let space = env.action_space();
        for _ in 0..100 {
            let a = space.sample(&mut rng);
            assert!(space.contains(&a));
            assert!(a[0] >= -1.0 && a[0] <= 1.0);
        }
    }

    #[test]
    fn vertical_control_runs_through_the_registry() {
        register_builtin().unwrap();
        let mut env = make(VERTICAL_CONTROL_ID, KwArgs::new()).unwrap();
        let (obs, _info) = env.reset(Some(0));
        assert_eq!(obs.len(), 3);
        for _ in 0..10 {
            let s = env.step(vec![0.5]).unwrap();
            assert!(s.reward <= 0.0);
            if s.done() { break; }
        }
        assert!(matches!(env.render(), Some(RenderFrame::Text(_))));
        env.close();
    }

    #[test]
    fn in_process_vector_env_from_config() {
        register_builtin().unwrap();
        let mut envs = VecEnvConfig::new(VERTICAL_CONTROL_ID, 2).with_seed(5).build_sync().unwrap();
        assert_eq!(envs.num_envs(), 2);
        assert_eq!(envs.observation_space().dim(), 3);
        let obs = envs.reset().unwrap();
        assert_eq!(obs.len(), 2);
        let batch = envs.step(vec![vec![0.0], vec![1.0]]).unwrap();
        assert_eq!(batch.len(), 2);
        envs.close();
    }
}
