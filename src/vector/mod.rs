//! Vectorized environments.
//!
//! [`SubprocVecEnv`] runs every environment in its own worker process;
//! [`SyncVectorEnv`] runs them in the calling thread. Both auto-reset finished
//! episodes and guard their batched operations with the same [`VecEnvState`]
//! machine: at most one step may be outstanding, and `reset`/`render` are
//! rejected while it is.

pub mod batch;
pub mod channel;
pub mod config;
pub mod error;
pub mod protocol;
pub mod subproc;
pub mod sync;
pub mod thunk;
pub mod worker;

use crate::core::RenderFrame;
use crate::registry::{Action, Observation};
use crate::spaces::BoxBounds;

pub use batch::StepBatch;
pub use config::{DEFAULT_WORKER_BIN, VecEnvConfig, WorkerCommand};
pub use error::VecEnvError;
pub use protocol::{EnvMetadata, RESET_OBSERVATION_KEY, TRUNCATED_KEY};
pub use subproc::SubprocVecEnv;
pub use sync::SyncVectorEnv;
pub use thunk::{EnvThunk, make_env, make_env_fns, make_vec_env};
pub use worker::{EnvRunner, WorkerError, run_stdio};

/// Lifecycle of a vectorized environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VecEnvState {
    Idle,
    /// `step_async` was called and `step_wait` has not collected the results.
    Stepping,
    /// A worker channel broke; only `close` is allowed.
    Poisoned,
    Closed,
}

impl VecEnvState {
    pub(crate) fn ensure_idle(self) -> Result<(), VecEnvError> {
        match self {
            VecEnvState::Idle => Ok(()),
            VecEnvState::Stepping => Err(VecEnvError::AlreadyStepping),
            VecEnvState::Poisoned => Err(VecEnvError::Poisoned),
            VecEnvState::Closed => Err(VecEnvError::Closed),
        }
    }

    pub(crate) fn ensure_stepping(self) -> Result<(), VecEnvError> {
        match self {
            VecEnvState::Stepping => Ok(()),
            VecEnvState::Idle => Err(VecEnvError::NotStepping),
            VecEnvState::Poisoned => Err(VecEnvError::Poisoned),
            VecEnvState::Closed => Err(VecEnvError::Closed),
        }
    }
}

/// N environments behind one batched interface. Results are always ordered by
/// worker index.
pub trait VecEnv {
    fn num_envs(&self) -> usize;

    fn observation_space(&self) -> &BoxBounds;

    fn action_space(&self) -> &BoxBounds;

    /// Reset every environment and return the N initial observations.
    fn reset(&mut self) -> Result<Vec<Observation>, VecEnvError>;

    /// Start a step with one action per environment. Does not wait for results.
    fn step_async(&mut self, actions: Vec<Action>) -> Result<(), VecEnvError>;

    /// Collect the results of the outstanding `step_async`.
    fn step_wait(&mut self) -> Result<StepBatch, VecEnvError>;

    fn step(&mut self, actions: Vec<Action>) -> Result<StepBatch, VecEnvError> {
        self.step_async(actions)?;
        self.step_wait()
    }

    fn render(&mut self) -> Result<Vec<Option<RenderFrame>>, VecEnvError>;

    /// Release every environment. Idempotent.
    fn close(&mut self);
}

pub(crate) fn check_actions(actions: &[Action], num_envs: usize, action_dim: usize) -> Result<(), VecEnvError> {
    if actions.len() != num_envs {
        return Err(VecEnvError::ActionCount { expected: num_envs, got: actions.len() });
    }
    if let Some(index) = actions.iter().position(|a| a.len() != action_dim) {
        return Err(VecEnvError::ActionShape { index, expected: action_dim, got: actions[index].len() });
    }
    // JSON has no encoding for NaN or infinities
    match actions.iter().position(|a| a.iter().any(|x| !x.is_finite())) {
        Some(index) => Err(VecEnvError::NonFiniteAction { index }),
        None => Ok(()),
    }
}

/// Every environment must agree with the first on observation and action dimensions.
pub(crate) fn check_metadata(metadata: &[EnvMetadata]) -> Result<(), VecEnvError> {
    let Some(first) = metadata.first() else {
        return Err(VecEnvError::NoEnvs);
    };
    for (index, meta) in metadata.iter().enumerate().skip(1) {
        for (what, expected, got) in [
            ("observation", first.observation_space.dim(), meta.observation_space.dim()),
            ("action", first.action_space.dim(), meta.action_space.dim()),
        ] {
            if expected != got {
                return Err(VecEnvError::Mismatch { index, what, expected, got });
            }
        }
    }
    Ok(())
}
