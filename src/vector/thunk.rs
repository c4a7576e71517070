//! Serializable environment constructors.
//!
//! An `EnvThunk` is the data needed to build one environment on the far side
//! of a process boundary: the registry id, the worker rank, the seed for its
//! first reset and the factory kwargs. Calling it looks the id up in the
//! worker's registry.

use serde::{Deserialize, Serialize};

use crate::core::Result;
use crate::registry::{self, EnvDyn, KwArgs};
use crate::utils::rng::rank_seed;
use crate::vector::config::WorkerCommand;
use crate::vector::error::VecEnvError;
use crate::vector::subproc::SubprocVecEnv;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvThunk {
    pub env_id: String,
    pub rank: usize,
    /// Seed consumed by the first reset.
    pub seed: u64,
    #[serde(default)]
    pub kwargs: KwArgs,
}

impl EnvThunk {
    pub fn new<S: Into<String>>(env_id: S, rank: usize, seed: u64) -> Self {
        Self { env_id: env_id.into(), rank, seed, kwargs: KwArgs::new() }
    }

    pub fn with_kwargs(mut self, kwargs: KwArgs) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn with_kwarg<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.kwargs.insert(key.into(), value.to_string());
        self
    }

    /// Build the environment through the process-local registry.
    pub fn call(&self) -> Result<Box<dyn EnvDyn>> {
        registry::make(&self.env_id, self.kwargs.clone())
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Constructor for the environment at `rank + start_index`, seeded with
/// `seed + rank + start_index`.
pub fn make_env(env_id: &str, rank: usize, seed: u64, start_index: usize) -> EnvThunk {
    let rank = rank + start_index;
    EnvThunk::new(env_id, rank, rank_seed(seed, rank))
}

/// One thunk per worker, ranks `start_index..start_index + num_envs`.
pub fn make_env_fns(env_id: &str, num_envs: usize, seed: u64, start_index: usize, kwargs: &KwArgs) -> Vec<EnvThunk> {
    (0..num_envs)
        .map(|i| make_env(env_id, i, seed, start_index).with_kwargs(kwargs.clone()))
        .collect()
}

/// Spawn a process pool of `num_envs` copies of `env_id`.
pub fn make_vec_env(
    env_id: &str,
    num_envs: usize,
    seed: u64,
    start_index: usize,
    kwargs: &KwArgs,
    worker: &WorkerCommand,
) -> std::result::Result<SubprocVecEnv, VecEnvError> {
    SubprocVecEnv::new(make_env_fns(env_id, num_envs, seed, start_index, kwargs), worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GymError;
    use crate::registry::{VERTICAL_CONTROL_ID, register_builtin};

    #[test]
    fn ranks_and_seeds_are_offset() {
        let fns = make_env_fns(VERTICAL_CONTROL_ID, 3, 100, 2, &KwArgs::new());
        let ranks: Vec<usize> = fns.iter().map(|t| t.rank).collect();
        let seeds: Vec<u64> = fns.iter().map(|t| t.seed).collect();
        assert_eq!(ranks, vec![2, 3, 4]);
        assert_eq!(seeds, vec![102, 103, 104]);
    }

    #[test]
    fn thunk_survives_encoding_and_builds() {
        register_builtin().unwrap();
        let thunk = make_env(VERTICAL_CONTROL_ID, 1, 7, 0).with_kwarg("runway_distance_km", 10.0);
        let decoded = EnvThunk::decode(&thunk.encode().unwrap()).unwrap();
        assert_eq!(decoded, thunk);
        let env = decoded.call().unwrap();
        assert_eq!(env.action_space().dim(), 1);
    }

    #[test]
    fn kwargs_default_to_empty() {
        let thunk = EnvThunk::decode(r#"{"env_id":"X-v0","rank":0,"seed":1}"#).unwrap();
        assert!(thunk.kwargs.is_empty());
    }

    #[test]
    fn unregistered_id_fails_to_build() {
        let thunk = EnvThunk::new("Missing-v0", 0, 0);
        assert!(matches!(thunk.call(), Err(GymError::UnknownEnv(_))));
    }
}
