use std::{
    fs::{self, File},
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use polars::{
    frame::DataFrame,
    io::SerWriter,
    prelude::{Column, CsvWriter, NamedFrom},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    agent::QLearningAgent,
    config::{AgentConfig, Config},
    data::Catalog,
    environment::Environment,
    error::{PricingError, Result},
    experience::Experience,
    table::ValueTable,
};

const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeStats {
    pub episode: usize,
    pub total_reward: f64,
    pub mean_abs_td_error: f64,
    pub explored_steps: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub episodes: Vec<EpisodeStats>,
    /// Set when the cancellation flag stopped the run early.
    pub cancelled: bool,
}

impl TrainingReport {
    /// Writes one row per episode.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut df = DataFrame::new(vec![
            Column::new(
                "episode".into(),
                self.episodes.iter().map(|e| e.episode as u64).collect::<Vec<_>>(),
            ),
            Column::new(
                "total_reward".into(),
                self.episodes.iter().map(|e| e.total_reward).collect::<Vec<_>>(),
            ),
            Column::new(
                "mean_abs_td_error".into(),
                self.episodes
                    .iter()
                    .map(|e| e.mean_abs_td_error)
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "explored_steps".into(),
                self.episodes
                    .iter()
                    .map(|e| e.explored_steps as u64)
                    .collect::<Vec<_>>(),
            ),
        ])?;

        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).finish(&mut df)?;
        tracing::info!(path = %path.display(), rows = df.height(), "wrote training metrics");
        Ok(())
    }
}

#[derive(Debug)]
pub struct TrainingOutcome {
    pub table: ValueTable,
    pub report: TrainingReport,
}

/// Runs repeated passes over the catalog in order, applying one Bellman update
/// per item. There is no convergence check; the configured episode count is
/// always run unless cancelled.
pub struct TrainingLoop {
    config: AgentConfig,
}

impl TrainingLoop {
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// RNG for this run: seeded when the config fixes a seed, from the OS otherwise.
    pub fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Trains a fresh table. `cancel` is polled between episodes.
    pub fn run<R: Rng>(
        &self,
        catalog: &Catalog,
        rng: &mut R,
        cancel: &AtomicBool,
    ) -> Result<TrainingOutcome> {
        if catalog.is_empty() {
            return Err(PricingError::EmptyCatalog);
        }
        let env = Environment::new(catalog, &self.config.discount_levels);
        let mut agent = QLearningAgent::new(env.states(), &self.config)?;
        let mut report = TrainingReport::default();

        tracing::info!(
            states = env.states(),
            actions = self.config.actions(),
            episodes = self.config.episodes,
            alpha = self.config.alpha,
            gamma = self.config.gamma,
            epsilon = self.config.epsilon,
            "starting training"
        );

        for episode in 0..self.config.episodes {
            if cancel.load(Ordering::Relaxed) {
                tracing::warn!(completed = episode, "training cancelled");
                report.cancelled = true;
                break;
            }
            let stats = Self::run_episode(&mut agent, &env, rng, episode)?;
            if (episode + 1) % PROGRESS_EVERY == 0 {
                tracing::info!(
                    episode = episode + 1,
                    total_reward = stats.total_reward,
                    mean_abs_td_error = stats.mean_abs_td_error,
                    explored = stats.explored_steps,
                    "training progress"
                );
            }
            report.episodes.push(stats);
        }

        Ok(TrainingOutcome {
            table: agent.into_table(),
            report,
        })
    }

    fn run_episode<R: Rng>(
        agent: &mut QLearningAgent,
        env: &Environment<'_>,
        rng: &mut R,
        episode: usize,
    ) -> Result<EpisodeStats> {
        let mut total_reward = 0.0;
        let mut abs_td_error = 0.0;
        let mut explored_steps = 0;

        for state in 0..env.states() {
            let choice = agent.choose(state, rng)?;
            let transition = env.step(state, choice.action)?;
            let td_error = agent.update(&Experience {
                state,
                action: choice.action,
                reward: transition.reward,
                next_state: transition.next_state,
            })?;

            total_reward += transition.reward;
            abs_td_error += td_error.abs();
            explored_steps += usize::from(choice.explored);
        }

        Ok(EpisodeStats {
            episode,
            total_reward,
            mean_abs_td_error: abs_td_error / env.states() as f64,
            explored_steps,
        })
    }
}

/// Trains on `catalog` with `config.agent` and persists the table to
/// `config.paths.model`, plus metrics when `config.paths.metrics` is set.
/// A cancelled run persists nothing.
pub fn train_and_save(
    config: &Config,
    catalog: &Catalog,
    cancel: &AtomicBool,
) -> Result<TrainingOutcome> {
    let training = TrainingLoop::new(config.agent.clone())?;
    let mut rng = training.rng();
    let outcome = training.run(catalog, &mut rng, cancel)?;
    if outcome.report.cancelled {
        return Err(PricingError::Cancelled {
            completed: outcome.report.episodes.len(),
        });
    }

    outcome
        .table
        .save(&config.paths.model, &config.agent.discount_levels)?;
    if let Some(metrics) = &config.paths.metrics {
        outcome.report.write_csv(metrics)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ZeroSalesPolicy, data::ItemAttributes};

    fn catalog(n: usize) -> Catalog {
        let items = (0..n)
            .map(|i| ItemAttributes::new(format!("p{i}"), 10.0, 100.0, 30.0))
            .collect();
        Catalog::from_items(items, ZeroSalesPolicy::Abort).expect("catalog")
    }

    fn agent_config(episodes: usize, epsilon: f64, seed: u64) -> AgentConfig {
        AgentConfig {
            alpha: 0.5,
            gamma: 0.9,
            epsilon,
            discount_levels: vec![0.0, 10.0],
            episodes,
            seed: Some(seed),
        }
    }

    #[test]
    fn first_greedy_step_updates_the_first_cell() {
        let training = TrainingLoop::new(agent_config(1, 0.0, 0)).expect("loop");
        let mut rng = training.rng();
        let outcome = training
            .run(&catalog(3), &mut rng, &AtomicBool::new(false))
            .expect("run");

        // All-zero rows pick action 0: reward 10, so Q(0,0) = 0.5 * 10.
        assert_eq!(outcome.table.get(0, 0).expect("get"), 5.0);
        assert_eq!(outcome.table.get(0, 1).expect("get"), 0.0);
        assert_eq!(outcome.report.episodes.len(), 1);
        assert_eq!(outcome.report.episodes[0].explored_steps, 0);
    }

    #[test]
    fn runs_the_configured_number_of_episodes() {
        let training = TrainingLoop::new(agent_config(25, 0.3, 9)).expect("loop");
        let mut rng = training.rng();
        let outcome = training
            .run(&catalog(4), &mut rng, &AtomicBool::new(false))
            .expect("run");
        assert_eq!(outcome.report.episodes.len(), 25);
        assert!(!outcome.report.cancelled);
        assert_eq!(outcome.table.shape(), (4, 2));
    }

    #[test]
    fn same_seed_trains_the_same_table() {
        let train = |seed| {
            let training = TrainingLoop::new(agent_config(50, 0.5, seed)).expect("loop");
            let mut rng = training.rng();
            training
                .run(&catalog(5), &mut rng, &AtomicBool::new(false))
                .expect("run")
                .table
        };
        assert_eq!(train(17), train(17));
    }

    #[test]
    fn learns_to_prefer_the_larger_discount() {
        let training = TrainingLoop::new(AgentConfig {
            episodes: 300,
            ..agent_config(0, 0.2, 5)
        })
        .expect("loop");
        let mut rng = training.rng();
        let outcome = training
            .run(&catalog(3), &mut rng, &AtomicBool::new(false))
            .expect("run");
        for state in 0..3 {
            assert_eq!(outcome.table.best_action(state).expect("best"), 1);
        }
    }

    #[test]
    fn cancellation_stops_before_the_next_episode() {
        let training = TrainingLoop::new(agent_config(10, 0.1, 1)).expect("loop");
        let mut rng = training.rng();
        let cancel = AtomicBool::new(true);
        let outcome = training.run(&catalog(3), &mut rng, &cancel).expect("run");
        assert!(outcome.report.cancelled);
        assert!(outcome.report.episodes.is_empty());
        assert!(outcome.table.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn train_and_save_persists_table_and_metrics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default();
        config.agent = agent_config(20, 0.1, 3);
        config.paths.model = dir.path().join("models/q.safetensors");
        config.paths.metrics = Some(dir.path().join("out/metrics.csv"));

        let outcome =
            train_and_save(&config, &catalog(3), &AtomicBool::new(false)).expect("train");
        let loaded = ValueTable::load_expected(&config.paths.model, 3, &[0.0, 10.0])
            .expect("load");
        assert_eq!(loaded, outcome.table);

        let metrics = fs::read_to_string(dir.path().join("out/metrics.csv")).expect("metrics");
        let mut lines = metrics.lines();
        assert_eq!(
            lines.next(),
            Some("episode,total_reward,mean_abs_td_error,explored_steps")
        );
        assert_eq!(lines.count(), 20);
    }

    #[test]
    fn cancelled_run_persists_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default();
        config.agent = agent_config(5, 0.1, 3);
        config.paths.model = dir.path().join("q.safetensors");

        let err = train_and_save(&config, &catalog(2), &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, PricingError::Cancelled { completed: 0 }));
        assert!(!config.paths.model.exists());
    }
}
