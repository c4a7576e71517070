//! Configuration for building vectorized environments.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::registry::{KwArgs, VERTICAL_CONTROL_ID};
use crate::vector::error::VecEnvError;
use crate::vector::subproc::SubprocVecEnv;
use crate::vector::sync::SyncVectorEnv;
use crate::vector::thunk::{EnvThunk, make_env_fns};

/// Name of the worker binary shipped with this crate.
pub const DEFAULT_WORKER_BIN: &str = "atc-gym-worker";

/// How to launch one worker process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the child, on top of the inherited ones.
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self { program: program.into(), args: Vec::new(), env: Vec::new() }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Locate binary `name` next to the running executable. Test binaries
    /// live one directory deeper (`target/<profile>/deps`), so the parent
    /// directory is tried as well. Falls back to a `PATH` lookup.
    pub fn sibling(name: &str) -> Self {
        let file = format!("{name}{}", std::env::consts::EXE_SUFFIX);
        let found = std::env::current_exe().ok().and_then(|exe| {
            let dir = exe.parent()?.to_path_buf();
            [Some(dir.as_path()), dir.parent()]
                .into_iter()
                .flatten()
                .map(|d| d.join(&file))
                .find(|candidate| candidate.is_file())
        });
        Self::new(found.unwrap_or_else(|| PathBuf::from(file)))
    }

    pub fn program(&self) -> &Path { &self.program }

    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        cmd
    }
}

impl Default for WorkerCommand {
    fn default() -> Self { Self::sibling(DEFAULT_WORKER_BIN) }
}

/// Everything needed to build a vectorized environment, loadable from JSON.
///
/// ```
/// use atc_gym::vector::VecEnvConfig;
///
/// let cfg = VecEnvConfig::new("VerticalControl-v0", 4)
///     .with_seed(7)
///     .with_kwarg("runway_distance_km", 50.0);
/// assert_eq!(cfg.thunks().len(), 4);
/// assert_eq!(cfg.thunks()[3].seed, 10);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VecEnvConfig {
    pub env_id: String,
    pub num_envs: usize,
    pub seed: u64,
    /// Rank of the first worker; ranks and seeds are offset by it.
    pub start_index: usize,
    pub kwargs: KwArgs,
    /// Worker launch command; the bundled worker binary when absent.
    pub worker: Option<WorkerCommand>,
}

impl Default for VecEnvConfig {
    fn default() -> Self { Self::new(VERTICAL_CONTROL_ID, 1) }
}

impl VecEnvConfig {
    pub fn new<S: Into<String>>(env_id: S, num_envs: usize) -> Self {
        Self {
            env_id: env_id.into(),
            num_envs,
            seed: 0,
            start_index: 0,
            kwargs: KwArgs::new(),
            worker: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn with_kwarg<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.kwargs.insert(key.into(), value.to_string());
        self
    }

    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn worker_command(&self) -> WorkerCommand {
        self.worker.clone().unwrap_or_default()
    }

    pub fn thunks(&self) -> Vec<EnvThunk> {
        make_env_fns(&self.env_id, self.num_envs, self.seed, self.start_index, &self.kwargs)
    }

    /// Spawn the process pool.
    pub fn build(&self) -> Result<SubprocVecEnv, VecEnvError> {
        SubprocVecEnv::new(self.thunks(), &self.worker_command())
    }

    /// Same environments, stepped in the current process.
    pub fn build_sync(&self) -> Result<SyncVectorEnv, VecEnvError> {
        SyncVectorEnv::new(self.thunks())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = VecEnvConfig::from_json_str(r#"{"num_envs": 3, "kwargs": {"dt": "0.5"}}"#).unwrap();
        assert_eq!(cfg.env_id, VERTICAL_CONTROL_ID);
        assert_eq!(cfg.num_envs, 3);
        assert_eq!(cfg.seed, 0);
        assert_eq!(cfg.kwargs.get("dt").map(String::as_str), Some("0.5"));
        assert!(cfg.worker.is_none());
    }

    #[test]
    fn thunks_carry_offsets_and_kwargs() {
        let cfg = VecEnvConfig::new("X-v0", 2).with_seed(10).with_start_index(5).with_kwarg("dt", 2);
        let thunks = cfg.thunks();
        assert_eq!(thunks.iter().map(|t| t.rank).collect::<Vec<_>>(), vec![5, 6]);
        assert_eq!(thunks.iter().map(|t| t.seed).collect::<Vec<_>>(), vec![15, 16]);
        assert!(thunks.iter().all(|t| t.kwargs.get("dt").map(String::as_str) == Some("2")));
    }

    #[test]
    fn worker_command_from_json() {
        let cfg = VecEnvConfig::from_json_str(
            r#"{"worker": {"program": "/opt/bin/worker", "args": ["--log-level", "debug"]}}"#,
        )
        .unwrap();
        let worker = cfg.worker_command();
        assert_eq!(worker.program(), Path::new("/opt/bin/worker"));
        assert_eq!(worker.args, vec!["--log-level", "debug"]);
        assert!(worker.env.is_empty());
    }

    #[test]
    fn missing_sibling_falls_back_to_bare_name() {
        let cmd = WorkerCommand::sibling("surely-not-a-real-binary");
        assert_eq!(
            cmd.program(),
            Path::new(&format!("surely-not-a-real-binary{}", std::env::consts::EXE_SUFFIX))
        );
    }
}
