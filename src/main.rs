// =============================================================================
// QWOP remote environment — demo CLI
// =============================================================================
// Run against a game-control service listening on localhost:
//   cargo run --release -- observe
//   cargo run --release -- random --episodes 5 --seed 1

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use qwop_env::{Action, QwopEnv, TcpGameClient};

#[derive(Parser)]
#[command(name = "qwop-env", about = "RL environment adapter for a remote QWOP instance")]
struct Cli {
    /// Address of the remote game-control service.
    #[arg(long, default_value = "127.0.0.1:1212")]
    addr: String,

    /// Bounded wait for each RPC reply, in seconds.
    #[arg(long, default_value_t = 50)]
    timeout_secs: u64,

    /// Seed for the adapter's random source.
    #[arg(long)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reset the environment and fetch a single observation.
    Observe,
    /// Roll out a uniform-random policy and report per-episode reward.
    Random {
        #[arg(long, default_value_t = 1)]
        episodes: usize,
        /// Safety cap on steps per episode.
        #[arg(long, default_value_t = 10_000)]
        max_steps: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let client = TcpGameClient::connect(&cli.addr, Duration::from_secs(cli.timeout_secs))
        .with_context(|| format!("failed to connect to game-control service at {}", cli.addr))?;
    let mut env = QwopEnv::new(client);
    let seed = env.seed(cli.seed);

    match cli.command {
        Command::Observe => {
            let obs = env.reset().context("reset failed")?;
            println!(
                "observation {}x{} (declared space {:?}), seed {}",
                obs.height(),
                obs.width(),
                env.observation_shape(),
                seed
            );
        }
        Command::Random {
            episodes,
            max_steps,
        } => {
            let mut policy_rng = SmallRng::seed_from_u64(seed);
            for episode in 0..episodes.max(1) {
                env.reset().context("reset failed")?;
                let mut steps = 0u64;
                loop {
                    let action = Action::from_index(policy_rng.random_range(0..Action::COUNT))?;
                    let step = env.step(action).context("step failed")?;
                    steps += 1;
                    if step.done || steps >= max_steps {
                        println!(
                            "episode {episode}: steps={steps} reward={:.3} score={:.3} done={}",
                            step.total_reward, step.score, step.done
                        );
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}
