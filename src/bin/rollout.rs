//! Random-action rollouts over a vectorized environment.
//!
//! ```text
//! rollout --num-envs 4 --steps 500 --seed 1
//! rollout --config pool.json --kwarg runway_distance_km=20
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::Level;

use atc_gym::spaces::Space;
use atc_gym::utils::rng_from_seed;
use atc_gym::vector::{VecEnv, VecEnvConfig, WorkerCommand};
use atc_gym::InfoValue;

#[derive(Parser, Debug)]
#[command(version, about = "Drive random-action rollouts across a pool of environments", long_about = None)]
struct Cli {
    /// JSON file with a `VecEnvConfig`; command-line flags override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    env_id: Option<String>,

    #[arg(long)]
    num_envs: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    start_index: Option<usize>,

    /// Environment kwarg, repeatable.
    #[arg(long = "kwarg", value_name = "KEY=VALUE", value_parser = parse_kwarg)]
    kwargs: Vec<(String, String)>,

    /// Number of batched steps to run.
    #[arg(long, default_value_t = 1000)]
    steps: usize,

    /// Path of the worker binary.
    #[arg(long)]
    worker: Option<PathBuf>,

    /// Step the environments in this process instead of spawning workers.
    #[arg(long, default_value_t = false)]
    in_process: bool,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn parse_kwarg(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

fn load_config(cli: &Cli) -> Result<VecEnvConfig> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            VecEnvConfig::from_json_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => VecEnvConfig::default(),
    };
    if let Some(id) = &cli.env_id { cfg.env_id = id.clone(); }
    if let Some(n) = cli.num_envs { cfg.num_envs = n; }
    if let Some(seed) = cli.seed { cfg.seed = seed; }
    if let Some(start) = cli.start_index { cfg.start_index = start; }
    for (k, v) in &cli.kwargs {
        cfg.kwargs.insert(k.clone(), v.clone());
    }
    if let Some(path) = &cli.worker {
        cfg.worker = Some(WorkerCommand::new(path));
    }
    if cfg.worker.is_none() {
        cfg.worker = Some(WorkerCommand::default().arg("--log-level").arg(cli.log_level.to_string()));
    }
    if cfg.num_envs == 0 {
        bail!("num_envs must be at least 1");
    }
    Ok(cfg)
}

fn run<V: VecEnv>(envs: &mut V, steps: usize, seed: u64) -> Result<()> {
    let mut rng = rng_from_seed(seed);
    let space = envs.action_space().clone();
    let n = envs.num_envs();
    envs.reset()?;

    let mut episodes = 0usize;
    let mut total_return = 0.0f64;
    for t in 0..steps {
        let actions = (0..n).map(|_| space.sample(&mut rng)).collect();
        let batch = envs.step(actions)?;
        for (i, info) in batch.infos.iter().enumerate() {
            if !batch.dones[i] { continue; }
            let ret = info.get("episode_return").and_then(InfoValue::as_f64).unwrap_or(f64::NAN);
            let len = info.get("episode_length").and_then(InfoValue::as_f64).unwrap_or(f64::NAN);
            tracing::info!(step = t, env = i, episode_return = ret, episode_length = len, "episode finished");
            episodes += 1;
            total_return += ret;
        }
    }
    if episodes > 0 {
        tracing::info!(episodes, mean_return = total_return / episodes as f64, "rollout finished");
    } else {
        tracing::info!(steps, "rollout finished without a completed episode");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.log_level).init();

    atc_gym::register_builtin()?;
    let cfg = load_config(&cli)?;
    tracing::info!(env = %cfg.env_id, num_envs = cfg.num_envs, seed = cfg.seed, "starting rollout");

    if cli.in_process {
        let mut envs = cfg.build_sync()?;
        let result = run(&mut envs, cli.steps, cfg.seed);
        envs.close();
        result
    } else {
        let mut envs = cfg.build().context("starting worker processes")?;
        let result = run(&mut envs, cli.steps, cfg.seed);
        envs.close();
        result
    }
}
