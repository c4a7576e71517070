//! Worker side of the process pool.
//!
//! A worker owns exactly one environment and serves commands from its channel
//! one at a time until `close` arrives or the orchestrator hangs up. Episodes
//! that end during `step` are reset on the spot so the next step always runs
//! on a live episode.

use std::io::{BufRead, Write};

use tracing::{debug, error, info, warn};

use crate::core::{GymError, InfoValue, RenderFrame};
use crate::registry::{Action, EnvDyn, Observation};
use crate::vector::channel::{CodecError, Duplex};
use crate::vector::protocol::{Command, EnvMetadata, Reply, StepReply, RESET_OBSERVATION_KEY, TRUNCATED_KEY};
use crate::vector::thunk::EnvThunk;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("bad bootstrap message: {0}")]
    Bootstrap(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("environment construction failed: {0}")]
    Gym(#[from] GymError),
}

/// One environment plus the auto-reset policy shared by every vector runner.
pub struct EnvRunner {
    env: Box<dyn EnvDyn>,
    env_id: String,
    rank: usize,
    /// Consumed by the first reset, whether explicit or automatic.
    pending_seed: Option<u64>,
}

impl EnvRunner {
    pub fn from_thunk(thunk: &EnvThunk) -> Result<Self, GymError> {
        Ok(Self {
            env: thunk.call()?,
            env_id: thunk.env_id.clone(),
            rank: thunk.rank,
            pending_seed: Some(thunk.seed),
        })
    }

    pub fn metadata(&self) -> EnvMetadata {
        EnvMetadata {
            env_id: self.env_id.clone(),
            rank: self.rank,
            pid: std::process::id(),
            observation_space: self.env.observation_space(),
            action_space: self.env.action_space(),
        }
    }

    pub fn reset(&mut self) -> Observation {
        let (obs, _info) = self.env.reset(self.pending_seed.take());
        obs
    }

    /// Step the environment; when the episode ends, reset it before replying.
    /// The reply keeps the final observation of the finished episode and
    /// carries the fresh one under `reset_observation`.
    pub fn step(&mut self, action: Action) -> Result<StepReply, GymError> {
        let mut s = self.env.step(action)?;
        let done = s.done();
        if s.truncated {
            s.info.insert(TRUNCATED_KEY, InfoValue::Bool(true));
        }
        if done {
            let fresh = self.reset();
            s.info.insert(RESET_OBSERVATION_KEY, InfoValue::Floats(fresh));
        }
        Ok(StepReply { observation: s.observation, reward: s.reward, done, info: s.info })
    }

    pub fn render(&self) -> Option<RenderFrame> {
        self.env.render()
    }

    pub fn close(&mut self) {
        self.env.close();
    }
}

fn parse_command(line: &str) -> Result<Command, WorkerError> {
    serde_json::from_str::<Command>(line).map_err(|e| {
        let tag = serde_json::from_str::<serde_json::Value>(line)
            .ok()
            .and_then(|v| v.get("cmd").and_then(|c| c.as_str()).map(str::to_owned));
        match tag {
            Some(tag) if !Command::TAGS.contains(&tag.as_str()) => WorkerError::UnknownCommand(tag),
            _ => WorkerError::Codec(CodecError::Json(e)),
        }
    })
}

fn bootstrap<R: BufRead, W: Write>(channel: &mut Duplex<R, W>) -> Result<EnvRunner, WorkerError> {
    let thunk = match channel.recv_line()? {
        Some(line) => EnvThunk::decode(line).map_err(|e| WorkerError::Bootstrap(e.to_string()))?,
        None => return Err(WorkerError::Bootstrap("channel closed before bootstrap".into())),
    };
    Ok(EnvRunner::from_thunk(&thunk)?)
}

/// Serve one environment over `channel` until `close` or end of input.
///
/// Returns an error for every condition that must terminate the worker
/// process with a failure status: undecodable bootstrap, construction
/// failure, unknown or malformed commands, and transport errors.
pub fn serve<R: BufRead, W: Write>(channel: &mut Duplex<R, W>) -> Result<(), WorkerError> {
    let mut runner = match bootstrap(channel) {
        Ok(runner) => runner,
        Err(e) => {
            error!(error = %e, "worker startup failed");
            // best effort, the orchestrator may already be gone
            let _ = channel.send(&Reply::Error(e.to_string()));
            return Err(e);
        }
    };

    let span = tracing::info_span!("worker", rank = runner.rank, env = %runner.env_id);
    let _enter = span.enter();
    channel.send(&Reply::Ready(runner.metadata()))?;
    info!("environment ready");

    loop {
        let command = match channel.recv_line()? {
            Some(line) => parse_command(line),
            None => {
                warn!("orchestrator closed the channel, shutting down");
                runner.close();
                return Ok(());
            }
        };
        let command = match command {
            Ok(command) => command,
            Err(e) => {
                error!(error = %e, "fatal command error");
                runner.close();
                return Err(e);
            }
        };
        debug!(cmd = command.tag(), "received command");

        let reply = match command {
            Command::Step(action) => match runner.step(action) {
                Ok(step) => Reply::Step(step),
                Err(e) => {
                    warn!(error = %e, "step rejected");
                    Reply::Error(e.to_string())
                }
            },
            Command::Reset => Reply::Reset(runner.reset()),
            Command::Render => Reply::Render(runner.render()),
            Command::Close => {
                runner.close();
                info!("closed");
                return Ok(());
            }
        };
        channel.send(&reply)?;
    }
}

/// Serve the environment described by the bootstrap line on stdin, speaking
/// the protocol over stdin/stdout. Environments must already be registered.
pub fn run_stdio() -> Result<(), WorkerError> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut channel = Duplex::new(stdin.lock(), stdout.lock());
    serve(&mut channel)
}
