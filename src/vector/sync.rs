// A synchronous vector environment running N environments in the current
// thread, with the same auto-reset policy and call protocol as the process pool.

use tracing::debug;

use crate::core::RenderFrame;
use crate::registry::{Action, Observation};
use crate::spaces::BoxBounds;
use crate::vector::batch::StepBatch;
use crate::vector::error::VecEnvError;
use crate::vector::protocol::EnvMetadata;
use crate::vector::thunk::EnvThunk;
use crate::vector::worker::EnvRunner;
use crate::vector::{VecEnv, VecEnvState, check_actions, check_metadata};

/// Runs N environments in the current thread.
///
/// - Construct from thunks: `SyncVectorEnv::new(make_env_fns(..))`
/// - Drive it through [`VecEnv`] exactly like `SubprocVecEnv`
pub struct SyncVectorEnv {
    runners: Vec<EnvRunner>,
    metadata: Vec<EnvMetadata>,
    pending: Option<Vec<Action>>,
    state: VecEnvState,
}

impl SyncVectorEnv {
    pub fn new(thunks: Vec<EnvThunk>) -> Result<Self, VecEnvError> {
        if thunks.is_empty() {
            return Err(VecEnvError::NoEnvs);
        }
        let runners = thunks
            .iter()
            .enumerate()
            .map(|(index, thunk)| {
                EnvRunner::from_thunk(thunk).map_err(|e| VecEnvError::Startup { index, message: e.to_string() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let metadata: Vec<EnvMetadata> = runners.iter().map(EnvRunner::metadata).collect();
        check_metadata(&metadata)?;
        debug!(num_envs = runners.len(), "built in-process environments");
        Ok(Self { runners, metadata, pending: None, state: VecEnvState::Idle })
    }

    pub fn metadata(&self) -> &[EnvMetadata] { &self.metadata }

    pub fn state(&self) -> VecEnvState { self.state }

    pub fn is_closed(&self) -> bool { self.state == VecEnvState::Closed }
}

impl VecEnv for SyncVectorEnv {
    fn num_envs(&self) -> usize { self.runners.len() }

    fn observation_space(&self) -> &BoxBounds { &self.metadata[0].observation_space }

    fn action_space(&self) -> &BoxBounds { &self.metadata[0].action_space }

    fn reset(&mut self) -> Result<Vec<Observation>, VecEnvError> {
        self.state.ensure_idle()?;
        Ok(self.runners.iter_mut().map(EnvRunner::reset).collect())
    }

    fn step_async(&mut self, actions: Vec<Action>) -> Result<(), VecEnvError> {
        self.state.ensure_idle()?;
        check_actions(&actions, self.runners.len(), self.action_space().dim())?;
        self.pending = Some(actions);
        self.state = VecEnvState::Stepping;
        Ok(())
    }

    fn step_wait(&mut self) -> Result<StepBatch, VecEnvError> {
        self.state.ensure_stepping()?;
        let actions = self.pending.take().unwrap_or_default();
        self.state = VecEnvState::Idle;
        let mut batch = StepBatch::with_capacity(self.runners.len());
        let mut first_error = None;
        for (index, (runner, action)) in self.runners.iter_mut().zip(actions).enumerate() {
            match runner.step(action) {
                Ok(step) => batch.push(step),
                Err(e) => {
                    first_error.get_or_insert(VecEnvError::Worker { index, message: e.to_string() });
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(batch),
        }
    }

    fn render(&mut self) -> Result<Vec<Option<RenderFrame>>, VecEnvError> {
        self.state.ensure_idle()?;
        Ok(self.runners.iter().map(EnvRunner::render).collect())
    }

    fn close(&mut self) {
        if self.state == VecEnvState::Closed {
            return;
        }
        self.pending = None;
        for runner in &mut self.runners {
            runner.close();
        }
        self.state = VecEnvState::Closed;
    }
}
