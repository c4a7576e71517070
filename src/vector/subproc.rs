//! Process-pool vectorized environment.
//!
//! Each environment lives in its own worker process, spawned from a
//! [`WorkerCommand`] and driven over its stdin/stdout with the line protocol
//! in [`crate::vector::protocol`]. The orchestrator is single-threaded: a
//! batched command is written to every worker first, then replies are read
//! back in worker order, so results line up with construction order no
//! matter which worker finishes first.

use std::io::BufReader;
use std::process::{Child, ChildStdin, ChildStdout, Stdio};

use tracing::{debug, info, warn};

use crate::core::RenderFrame;
use crate::registry::{Action, Observation};
use crate::spaces::BoxBounds;
use crate::vector::batch::StepBatch;
use crate::vector::channel::Duplex;
use crate::vector::config::WorkerCommand;
use crate::vector::error::VecEnvError;
use crate::vector::protocol::{Command, EnvMetadata, Reply};
use crate::vector::thunk::EnvThunk;
use crate::vector::{VecEnv, VecEnvState, check_actions, check_metadata};

type WorkerChannel = Duplex<BufReader<ChildStdout>, ChildStdin>;

/// Orchestrator side of one worker: its process and our end of its pipes.
struct WorkerHandle {
    index: usize,
    child: Child,
    /// Dropped on close so the worker sees end of input.
    channel: Option<WorkerChannel>,
    /// A command was sent and its reply has not been read yet.
    awaiting: bool,
}

impl WorkerHandle {
    fn spawn(index: usize, thunk: &EnvThunk, worker: &WorkerCommand) -> Result<Self, VecEnvError> {
        let mut child = worker
            .to_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| VecEnvError::Spawn { index, source })?;
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VecEnvError::Spawn {
                    index,
                    source: std::io::Error::other("worker stdio was not captured"),
                });
            }
        };
        debug!(index, pid = child.id(), program = %worker.program().display(), "spawned worker");
        let mut handle = Self {
            index,
            child,
            channel: Some(Duplex::new(BufReader::new(stdout), stdin)),
            awaiting: false,
        };
        if let Err(e) = handle.send_raw(thunk) {
            handle.kill();
            return Err(e);
        }
        Ok(handle)
    }

    fn channel(&mut self) -> Result<&mut WorkerChannel, VecEnvError> {
        let index = self.index;
        self.channel.as_mut().ok_or(VecEnvError::Disconnected { index })
    }

    fn send_raw<T: serde::Serialize>(&mut self, msg: &T) -> Result<(), VecEnvError> {
        let index = self.index;
        self.channel()?.send(msg).map_err(|e| VecEnvError::from_codec(index, e))
    }

    fn send(&mut self, command: &Command) -> Result<(), VecEnvError> {
        self.send_raw(command)?;
        self.awaiting = true;
        Ok(())
    }

    fn recv(&mut self) -> Result<Reply, VecEnvError> {
        let index = self.index;
        // the reply is consumed (or lost) either way
        self.awaiting = false;
        match self.channel()?.recv::<Reply>() {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(VecEnvError::Disconnected { index }),
            Err(e) => Err(VecEnvError::from_codec(index, e)),
        }
    }

    fn handshake(&mut self) -> Result<EnvMetadata, VecEnvError> {
        let index = self.index;
        match self.recv()? {
            Reply::Ready(meta) => Ok(meta),
            Reply::Error(message) => Err(VecEnvError::Startup { index, message }),
            other => Err(VecEnvError::UnexpectedReply { index, expected: "ready", got: other.kind() }),
        }
    }

    fn kill(&mut self) {
        self.channel = None;
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Runs N environments in N worker processes.
///
/// ```no_run
/// use atc_gym::registry::VERTICAL_CONTROL_ID;
/// use atc_gym::vector::{VecEnv, VecEnvConfig};
///
/// let mut envs = VecEnvConfig::new(VERTICAL_CONTROL_ID, 4).with_seed(1).build()?;
/// let obs = envs.reset()?;
/// assert_eq!(obs.len(), 4);
/// let batch = envs.step(vec![vec![0.0]; 4])?;
/// assert_eq!(batch.rewards.len(), 4);
/// envs.close();
/// # Ok::<(), atc_gym::vector::VecEnvError>(())
/// ```
pub struct SubprocVecEnv {
    workers: Vec<WorkerHandle>,
    metadata: Vec<EnvMetadata>,
    state: VecEnvState,
}

impl SubprocVecEnv {
    /// Spawn one worker per thunk and wait until every environment is built.
    /// If any worker fails to start, all workers are killed.
    pub fn new(thunks: Vec<EnvThunk>, worker: &WorkerCommand) -> Result<Self, VecEnvError> {
        if thunks.is_empty() {
            return Err(VecEnvError::NoEnvs);
        }
        info!(num_envs = thunks.len(), env = %thunks[0].env_id, "starting worker processes");
        // workers are reaped by Drop on every early return below
        let mut env = Self {
            workers: Vec::with_capacity(thunks.len()),
            metadata: Vec::with_capacity(thunks.len()),
            state: VecEnvState::Idle,
        };
        for (index, thunk) in thunks.iter().enumerate() {
            env.workers.push(WorkerHandle::spawn(index, thunk, worker)?);
        }
        for w in &mut env.workers {
            let meta = w.handshake()?;
            debug!(index = w.index, rank = meta.rank, pid = meta.pid, "worker ready");
            env.metadata.push(meta);
        }
        check_metadata(&env.metadata)?;
        Ok(env)
    }

    /// Handshake data reported by each worker, in worker order.
    pub fn metadata(&self) -> &[EnvMetadata] { &self.metadata }

    pub fn state(&self) -> VecEnvState { self.state }

    pub fn is_closed(&self) -> bool { self.state == VecEnvState::Closed }

    fn broadcast<I>(&mut self, commands: I) -> Result<(), VecEnvError>
    where
        I: IntoIterator<Item = Command>,
    {
        for (w, command) in self.workers.iter_mut().zip(commands) {
            if let Err(e) = w.send(&command) {
                warn!(index = w.index, error = %e, cmd = command.tag(), "send failed");
                self.state = VecEnvState::Poisoned;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Read one reply from every worker in order. A worker-reported error is
    /// returned only after all replies are read; transport failures abort at
    /// once and poison the environment.
    fn gather<T>(&mut self, expected: &'static str, extract: fn(Reply) -> Result<T, Reply>) -> Result<Vec<T>, VecEnvError> {
        let mut out = Vec::with_capacity(self.workers.len());
        let mut first_error = None;
        for w in &mut self.workers {
            let index = w.index;
            let reply = match w.recv() {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(index, error = %e, "lost worker");
                    self.state = VecEnvState::Poisoned;
                    return Err(e);
                }
            };
            match reply {
                Reply::Error(message) => {
                    warn!(index, %message, "worker reported an error");
                    first_error.get_or_insert(VecEnvError::Worker { index, message });
                }
                other => match extract(other) {
                    Ok(value) => out.push(value),
                    Err(other) => {
                        self.state = VecEnvState::Poisoned;
                        return Err(VecEnvError::UnexpectedReply { index, expected, got: other.kind() });
                    }
                },
            }
        }
        self.state = VecEnvState::Idle;
        match first_error {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }
}

impl VecEnv for SubprocVecEnv {
    fn num_envs(&self) -> usize { self.workers.len() }

    fn observation_space(&self) -> &BoxBounds { &self.metadata[0].observation_space }

    fn action_space(&self) -> &BoxBounds { &self.metadata[0].action_space }

    fn reset(&mut self) -> Result<Vec<Observation>, VecEnvError> {
        self.state.ensure_idle()?;
        let n = self.workers.len();
        self.broadcast(std::iter::repeat_n(Command::Reset, n))?;
        self.gather("reset", |reply| match reply {
            Reply::Reset(obs) => Ok(obs),
            other => Err(other),
        })
    }

    fn step_async(&mut self, actions: Vec<Action>) -> Result<(), VecEnvError> {
        self.state.ensure_idle()?;
        check_actions(&actions, self.workers.len(), self.action_space().dim())?;
        self.broadcast(actions.into_iter().map(Command::Step))?;
        self.state = VecEnvState::Stepping;
        Ok(())
    }

    fn step_wait(&mut self) -> Result<StepBatch, VecEnvError> {
        self.state.ensure_stepping()?;
        let replies = self.gather("step", |reply| match reply {
            Reply::Step(step) => Ok(step),
            other => Err(other),
        })?;
        Ok(replies.into_iter().collect())
    }

    fn render(&mut self) -> Result<Vec<Option<RenderFrame>>, VecEnvError> {
        self.state.ensure_idle()?;
        let n = self.workers.len();
        self.broadcast(std::iter::repeat_n(Command::Render, n))?;
        self.gather("render", |reply| match reply {
            Reply::Render(frame) => Ok(frame),
            other => Err(other),
        })
    }

    /// Drain outstanding replies, ask every worker to exit and wait for it.
    /// Safe to call repeatedly and after workers have died.
    fn close(&mut self) {
        if self.state == VecEnvState::Closed {
            return;
        }
        for w in &mut self.workers {
            if w.awaiting {
                match w.recv() {
                    Ok(reply) => debug!(index = w.index, kind = reply.kind(), "discarded pending reply"),
                    Err(e) => debug!(index = w.index, error = %e, "pending reply lost"),
                }
            }
            if let Err(e) = w.send_raw(&Command::Close) {
                debug!(index = w.index, error = %e, "worker already gone");
            }
            w.channel = None;
        }
        for w in &mut self.workers {
            match w.child.wait() {
                Ok(status) if status.success() => debug!(index = w.index, "worker exited"),
                Ok(status) => warn!(index = w.index, %status, "worker exited abnormally"),
                Err(e) => warn!(index = w.index, error = %e, "failed to wait for worker"),
            }
        }
        self.state = VecEnvState::Closed;
        info!(num_envs = self.workers.len(), "closed worker processes");
    }
}

impl Drop for SubprocVecEnv {
    fn drop(&mut self) {
        if self.state == VecEnvState::Closed {
            return;
        }
        for w in &mut self.workers {
            w.kill();
        }
    }
}
