mod tui;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pacman_core::{
    agent::PlayerNumber,
    config::{GameConfig, LearningConfig},
    game_state::PlayerSetup,
    map::Level,
    persistence::ModelStore,
    q_learning::QLearningAgent,
    training::Trainer,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Pac-Man simulation with a Q-learning pacman", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the Q-learning pacman on a map and save the table
    Train(TrainArgs),
    /// Play a map in the terminal
    Play(PlayArgs),
    /// Watch the trained pacman play greedily
    Watch(WatchArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
struct MapArgs {
    /// Map file to load
    #[arg(short, long, value_name = "MAP_FILE", default_value = "maps/level1.txt")]
    map: PathBuf,

    /// Directory holding saved Q-tables
    #[arg(long, value_name = "DIR", default_value = "models")]
    models: PathBuf,

    /// JSON file with game and learning settings
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Seed for ghosts and exploration
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[command(flatten)]
    map: MapArgs,

    /// Number of episodes to train
    #[arg(short, long, default_value_t = 1000)]
    episodes: usize,

    #[arg(long)]
    alpha: Option<f64>,

    #[arg(long)]
    gamma: Option<f64>,

    #[arg(long)]
    epsilon: Option<f64>,

    /// Tick budget per episode; 0 means unlimited
    #[arg(long, default_value_t = 1000)]
    max_ticks: u64,

    /// Greedy episodes to play after training
    #[arg(long, default_value_t = 0)]
    evaluate: usize,
}

#[derive(Args, Debug)]
struct PlayArgs {
    #[command(flatten)]
    map: MapArgs,

    /// Who drives the pacman: 0 random, 1/2 human, 3 learned
    #[arg(long, default_value_t = 1)]
    pacman_player: u8,

    /// Who drives the first ghost: 0 random, 1/2 human, 3 learned
    #[arg(long, default_value_t = 0)]
    ghost_player: u8,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[command(flatten)]
    map: MapArgs,

    /// Who drives the first ghost: 0 random, 1/2 human
    #[arg(long, default_value_t = 0)]
    ghost_player: u8,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 150)]
    tick_ms: u64,
}

/// Contents of the optional settings file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Settings {
    game: GameConfig,
    learning: LearningConfig,
}

impl Settings {
    fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Everything a subcommand needs before it starts.
struct Setup {
    level: Level,
    store: ModelStore,
    settings: Settings,
}

impl MapArgs {
    fn setup(&self) -> Result<Setup> {
        if !self.map.exists() {
            return Err(anyhow::anyhow!(
                "Map file does not exist: {}",
                self.map.display()
            ));
        }
        let map_id = self
            .map
            .file_stem()
            .and_then(|stem| stem.to_str())
            .context("Map file name is not valid UTF-8")?;
        let text = std::fs::read_to_string(&self.map)
            .with_context(|| format!("Failed to read map file {}", self.map.display()))?;
        let level = Level::parse(map_id, &text)?;

        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(seed) = self.seed {
            settings.game.seed = Some(seed);
            settings.learning.seed = Some(seed);
        }

        Ok(Setup {
            level,
            store: ModelStore::new(&self.models),
            settings,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => train(args),
        Command::Play(args) => play(args),
        Command::Watch(args) => watch(args),
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn train(args: TrainArgs) -> Result<()> {
    init_logging();
    let Setup {
        level,
        store,
        settings,
    } = args.map.setup()?;

    let mut learning = settings.learning;
    learning.alpha = args.alpha.unwrap_or(learning.alpha);
    learning.gamma = args.gamma.unwrap_or(learning.gamma);
    learning.epsilon = args.epsilon.unwrap_or(learning.epsilon);

    let map_id = level.id.clone();
    let table = store.load_or_default(&map_id)?;
    let mut learner = QLearningAgent::with_table(learning, table);
    info!(
        map_id = %map_id,
        alpha = learner.config().alpha,
        gamma = learner.config().gamma,
        epsilon = learner.config().epsilon,
        entries = learner.table().len(),
        "starting training"
    );

    let mut trainer = Trainer::new(level, settings.game);
    trainer.max_ticks = (args.max_ticks > 0).then_some(args.max_ticks);
    trainer.train(&mut learner, args.episodes)?;
    store.save(&map_id, learner.table())?;

    if args.evaluate > 0 {
        let report = trainer.evaluate(&mut learner, args.evaluate)?;
        info!(
            episodes = args.evaluate,
            wins = report.wins(),
            losses = report.losses(),
            unfinished = report.unfinished(),
            mean_score = report.mean_score(),
            best_score = ?report.best_score(),
            "greedy evaluation"
        );
    }
    Ok(())
}

fn play(args: PlayArgs) -> Result<()> {
    let players = PlayerSetup {
        pacman: PlayerNumber::try_from(args.pacman_player)?,
        ghost: PlayerNumber::try_from(args.ghost_player)?,
    };
    let Setup {
        level,
        store,
        settings,
    } = args.map.setup()?;

    let learner = if players.pacman == PlayerNumber::Learned {
        let table = store.load(&level.id)?;
        Some(QLearningAgent::with_table(settings.learning.greedy(), table))
    } else {
        None
    };
    tui::run(level, players, settings.game, learner, args.tick_ms)
}

fn watch(args: WatchArgs) -> Result<()> {
    let players = PlayerSetup {
        ghost: PlayerNumber::try_from(args.ghost_player)?,
        ..PlayerSetup::learner()
    };
    let Setup {
        level,
        store,
        settings,
    } = args.map.setup()?;

    let table = store.load(&level.id)?;
    let learner = QLearningAgent::with_table(settings.learning.greedy(), table);
    tui::run(level, players, settings.game, Some(learner), args.tick_ms)
}
