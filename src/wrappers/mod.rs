// Wrappers applied by the registry when building environments:
// - TimeLimit
// - RecordEpisodeStatistics

use crate::core::{Env, Info, InfoValue, RenderFrame, Step};
use crate::spaces::{BoxBounds, HasSpaces};

/// A wrapper that enforces a maximum number of steps per episode, marking truncation when exceeded.
pub struct TimeLimit<E: Env> {
    inner: E,
    max_steps: u32,
    steps: u32,
}

impl<E: Env> TimeLimit<E> {
    pub fn new(inner: E, max_steps: u32) -> Self {
        Self { inner, max_steps, steps: 0 }
    }
}

impl<E: Env> Env for TimeLimit<E> {
    type Obs = E::Obs;
    type Act = E::Act;

    fn reset(&mut self, seed: Option<u64>) -> (Self::Obs, Info) {
        self.steps = 0;
        self.inner.reset(seed)
    }

    fn step(&mut self, action: Self::Act) -> Step<Self::Obs> {
        let mut s = self.inner.step(action);
        self.steps += 1;
        if !s.terminated && !s.truncated && self.steps >= self.max_steps {
            s.truncated = true;
        }
        s
    }

    fn render(&self) -> Option<RenderFrame> { self.inner.render() }
    fn close(&mut self) { self.inner.close() }
}

impl<E: Env + HasSpaces> HasSpaces for TimeLimit<E> {
    fn observation_space(&self) -> BoxBounds { self.inner.observation_space() }
    fn action_space(&self) -> BoxBounds { self.inner.action_space() }
}

/// RecordEpisodeStatistics tracks cumulative return and episode length.
/// On episode end (terminated or truncated), it injects keys into the returned Step's Info:
/// - "episode_return": f64
/// - "episode_length": i64
pub struct RecordEpisodeStatistics<E: Env> {
    inner: E,
    ep_return: f64,
    ep_length: i64,
}

impl<E: Env> RecordEpisodeStatistics<E> {
    pub fn new(inner: E) -> Self { Self { inner, ep_return: 0.0, ep_length: 0 } }
}

impl<E: Env> Env for RecordEpisodeStatistics<E> {
    type Obs = E::Obs;
    type Act = E::Act;

    fn reset(&mut self, seed: Option<u64>) -> (Self::Obs, Info) {
        self.ep_return = 0.0;
        self.ep_length = 0;
        self.inner.reset(seed)
    }

    fn step(&mut self, action: Self::Act) -> Step<Self::Obs> {
        let mut s = self.inner.step(action);
        self.ep_return += s.reward as f64;
        self.ep_length += 1;
        if s.done() {
            s.info.insert("episode_return", InfoValue::from(self.ep_return));
            s.info.insert("episode_length", InfoValue::from(self.ep_length));
            self.ep_return = 0.0;
            self.ep_length = 0;
        }
        s
    }

    fn render(&self) -> Option<RenderFrame> { self.inner.render() }
    fn close(&mut self) { self.inner.close() }
}

impl<E: Env + HasSpaces> HasSpaces for RecordEpisodeStatistics<E> {
    fn observation_space(&self) -> BoxBounds { self.inner.observation_space() }
    fn action_space(&self) -> BoxBounds { self.inner.action_space() }
}
