//! Registry of environment factories, keyed by id.
//!
//! Worker processes only ever receive an id plus kwargs; the factory that
//! turns them into an environment has to be registered in the worker binary
//! before its command loop starts. `register_builtin` does that for the
//! environments shipped with this crate.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::core::{Env, GymError, Info, RenderFrame, Result, Step};
use crate::envs::{VerticalControlConfig, VerticalControlEnv};
use crate::spaces::{BoxBounds, HasSpaces};
use crate::wrappers::{RecordEpisodeStatistics, TimeLimit};

/// Key-value kwargs for make(). Stringly-typed so they can cross process boundaries untouched.
pub type KwArgs = HashMap<String, String>;

/// Flat observation vector as seen by vectorized runners.
pub type Observation = Vec<f32>;
/// Flat action vector as seen by vectorized runners.
pub type Action = Vec<f32>;

/// Id of the built-in single-aircraft vertical-control task.
pub const VERTICAL_CONTROL_ID: &str = "VerticalControl-v0";

/// Kwarg that overrides `EnvSpec::max_episode_steps` for a single make() call.
pub const MAX_EPISODE_STEPS_KWARG: &str = "max_episode_steps";

/// Environment specification metadata.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EnvSpec {
    /// Unique identifier like "VerticalControl-v0".
    pub id: String,
    /// When set, make() wraps the environment in a TimeLimit.
    pub max_episode_steps: Option<u32>,
    /// When set, make() wraps the environment in RecordEpisodeStatistics.
    pub record_stats: bool,
}

impl EnvSpec {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            max_episode_steps: None,
            record_stats: false,
        }
    }

    pub fn with_max_episode_steps(mut self, steps: u32) -> Self {
        self.max_episode_steps = Some(steps);
        self
    }

    pub fn with_record_stats(mut self, record: bool) -> Self {
        self.record_stats = record;
        self
    }
}

/// Type-erased environment over flat `f32` observations and actions.
pub trait EnvDyn: Send {
    fn reset(&mut self, seed: Option<u64>) -> (Observation, Info);
    fn step(&mut self, action: Action) -> Result<Step<Observation>>;
    fn render(&self) -> Option<RenderFrame>;
    fn close(&mut self);
    fn observation_space(&self) -> BoxBounds;
    fn action_space(&self) -> BoxBounds;
}

/// Adapts any fixed-size Env into EnvDyn.
struct DynEnv<E: Env>(E);

impl<E> EnvDyn for DynEnv<E>
where
    E: Env + HasSpaces + Send,
    E::Obs: Into<Observation>,
    E::Act: TryFrom<Action>,
{
    fn reset(&mut self, seed: Option<u64>) -> (Observation, Info) {
        let (obs, info) = self.0.reset(seed);
        (obs.into(), info)
    }

    fn step(&mut self, action: Action) -> Result<Step<Observation>> {
        let got = action.len();
        let action = <E::Act as TryFrom<Action>>::try_from(action).map_err(|_| {
            GymError::InvalidAction(format!(
                "expected {} action dimensions, got {got}",
                self.0.action_space().dim()
            ))
        })?;
        Ok(self.0.step(action).map_observation(Into::into))
    }

    fn render(&self) -> Option<RenderFrame> { self.0.render() }
    fn close(&mut self) { self.0.close() }
    fn observation_space(&self) -> BoxBounds { self.0.observation_space() }
    fn action_space(&self) -> BoxBounds { self.0.action_space() }
}

/// Factory closure type: builds an environment from its spec and kwargs.
pub type FactoryFn = Box<dyn Fn(&EnvSpec, KwArgs) -> Result<Box<dyn EnvDyn>> + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    specs: HashMap<String, EnvSpec>,
    factories: HashMap<String, FactoryFn>,
}

struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    fn new() -> Self { Self { inner: RwLock::new(RegistryInner::default()) } }

    fn register(&self, spec: EnvSpec, factory: FactoryFn) -> Result<()> {
        let mut g = self.inner.write().map_err(|_| GymError::Other("registry poisoned".into()))?;
        if g.specs.contains_key(&spec.id) {
            return Err(GymError::AlreadyRegistered(spec.id));
        }
        g.factories.insert(spec.id.clone(), factory);
        g.specs.insert(spec.id.clone(), spec);
        Ok(())
    }

    fn get_spec(&self, id: &str) -> Option<EnvSpec> {
        let g = self.inner.read().ok()?;
        g.specs.get(id).cloned()
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = match self.inner.read() {
            Ok(g) => g.specs.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        ids.sort();
        ids
    }

    fn make(&self, id: &str, kwargs: KwArgs) -> Result<Box<dyn EnvDyn>> {
        let guard = self.inner.read().map_err(|_| GymError::Other("registry poisoned".into()))?;
        match (guard.specs.get(id), guard.factories.get(id)) {
            (Some(spec), Some(f)) => (f)(spec, kwargs),
            _ => Err(GymError::UnknownEnv(id.to_string())),
        }
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Register an environment spec and its factory globally.
pub fn register(spec: EnvSpec, factory: FactoryFn) -> Result<()> { registry().register(spec, factory) }

/// Fetch a registered EnvSpec by id.
pub fn get_spec(id: &str) -> Option<EnvSpec> { registry().get_spec(id) }

/// Sorted list of registered ids.
pub fn registered_ids() -> Vec<String> { registry().ids() }

/// Construct an environment by id with kwargs, returning a boxed dynamic env.
pub fn make<S: AsRef<str>>(id: S, kwargs: KwArgs) -> Result<Box<dyn EnvDyn>> { registry().make(id.as_ref(), kwargs) }

fn take_max_episode_steps(kwargs: &mut KwArgs) -> Result<Option<u32>> {
    match kwargs.remove(MAX_EPISODE_STEPS_KWARG) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| GymError::InvalidArgument(format!("{MAX_EPISODE_STEPS_KWARG}={raw:?}: {e}"))),
        None => Ok(None),
    }
}

fn erase<E>(env: E) -> Box<dyn EnvDyn>
where
    E: Env + HasSpaces + Send + 'static,
    E::Obs: Into<Observation>,
    E::Act: TryFrom<Action>,
{
    Box::new(DynEnv(env))
}

/// Adapt a fallible constructor into a factory. The factory applies the
/// TimeLimit and RecordEpisodeStatistics wrappers requested by the spec.
pub fn factory_of<E, F>(ctor: F) -> FactoryFn
where
    E: Env + HasSpaces + Send + 'static,
    E::Obs: Into<Observation> + 'static,
    E::Act: TryFrom<Action> + 'static,
    F: Fn(KwArgs) -> Result<E> + Send + Sync + 'static,
{
    Box::new(move |spec: &EnvSpec, mut kwargs: KwArgs| {
        let max_steps = take_max_episode_steps(&mut kwargs)?.or(spec.max_episode_steps);
        let env = ctor(kwargs)?;
        Ok(match (max_steps, spec.record_stats) {
            (Some(n), true) => erase(RecordEpisodeStatistics::new(TimeLimit::new(env, n))),
            (Some(n), false) => erase(TimeLimit::new(env, n)),
            (None, true) => erase(RecordEpisodeStatistics::new(env)),
            (None, false) => erase(env),
        })
    })
}

/// Register the environments shipped with this crate. Safe to call repeatedly.
pub fn register_builtin() -> Result<()> {
    let spec = EnvSpec::new(VERTICAL_CONTROL_ID).with_record_stats(true);
    let factory = factory_of(|kwargs: KwArgs| {
        VerticalControlEnv::new(VerticalControlConfig::from_kwargs(&kwargs)?, 0)
    });
    match register(spec, factory) {
        Ok(()) | Err(GymError::AlreadyRegistered(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
