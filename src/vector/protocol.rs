//! Messages exchanged between the orchestrator and its workers.
//!
//! Startup: orchestrator writes one `EnvThunk` line; the worker answers
//! `Reply::Ready` (or `Reply::Error` and exits). Afterwards every `Command`
//! except `Close` gets exactly one reply, in order.

use serde::{Deserialize, Serialize};

use crate::core::{Info, RenderFrame};
use crate::registry::{Action, Observation};
use crate::spaces::BoxBounds;

/// Info key carrying the observation produced by an automatic reset.
pub const RESET_OBSERVATION_KEY: &str = "reset_observation";
/// Info key set when an episode ended through truncation rather than termination.
pub const TRUNCATED_KEY: &str = "truncated";

/// Orchestrator -> worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data", rename_all = "snake_case")]
pub enum Command {
    Step(Action),
    Reset,
    Render,
    Close,
}

impl Command {
    /// Wire tags of every command a worker understands.
    pub const TAGS: [&'static str; 4] = ["step", "reset", "render", "close"];

    pub fn tag(&self) -> &'static str {
        match self {
            Command::Step(_) => "step",
            Command::Reset => "reset",
            Command::Render => "render",
            Command::Close => "close",
        }
    }
}

/// What a worker reports about its environment once it is constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvMetadata {
    pub env_id: String,
    pub rank: usize,
    pub pid: u32,
    pub observation_space: BoxBounds,
    pub action_space: BoxBounds,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepReply {
    pub observation: Observation,
    pub reward: f32,
    pub done: bool,
    pub info: Info,
}

/// Worker -> orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Reply {
    Ready(EnvMetadata),
    Step(StepReply),
    Reset(Observation),
    Render(Option<RenderFrame>),
    Error(String),
}

impl Reply {
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Ready(_) => "ready",
            Reply::Step(_) => "step",
            Reply::Reset(_) => "reset",
            Reply::Render(_) => "render",
            Reply::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_tag_and_payload() {
        assert_eq!(serde_json::to_string(&Command::Step(vec![0.5])).unwrap(), r#"{"cmd":"step","data":[0.5]}"#);
        assert_eq!(serde_json::to_string(&Command::Reset).unwrap(), r#"{"cmd":"reset"}"#);
        let back: Command = serde_json::from_str(r#"{"cmd":"close"}"#).unwrap();
        assert_eq!(back, Command::Close);
        for cmd in [Command::Step(vec![]), Command::Reset, Command::Render, Command::Close] {
            assert!(Command::TAGS.contains(&cmd.tag()));
        }
    }

    #[test]
    fn render_reply_without_frame() {
        let text = serde_json::to_string(&Reply::Render(None)).unwrap();
        let back: Reply = serde_json::from_str(&text).unwrap();
        assert_eq!(back, Reply::Render(None));
        assert_eq!(back.kind(), "render");
    }
}
