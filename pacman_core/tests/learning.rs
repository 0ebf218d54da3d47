use pacman_core::{
    PacmanError,
    config::{GameConfig, LearningConfig},
    game_state::{GameStatus, PlayerSetup},
    map::Level,
    persistence::ModelStore,
    q_learning::{QLearningAgent, QTable},
    session::GameSession,
    training::Trainer,
};
use tempfile::TempDir;

const LEVEL1: &str = include_str!("../../maps/level1.txt");

fn level1() -> Level {
    Level::parse("level1", LEVEL1).expect("level parses")
}

fn learning_config() -> LearningConfig {
    LearningConfig {
        seed: Some(17),
        ..LearningConfig::new(0.2, 0.9, 0.1)
    }
}

#[test]
fn test_training_fills_the_table_and_reports_every_episode() {
    let mut trainer = Trainer::new(level1(), GameConfig::seeded(5));
    trainer.max_ticks = Some(300);
    trainer.log_interval = 10;
    let mut learner = QLearningAgent::new(learning_config());

    let report = trainer.train(&mut learner, 30).unwrap();

    assert_eq!(report.episodes.len(), 30);
    assert_eq!(
        report.wins() + report.losses() + report.unfinished(),
        report.episodes.len()
    );
    assert_eq!(report.table_size, learner.table().len());
    assert!(!learner.table().is_empty());
    for episode in &report.episodes {
        assert!(episode.ticks <= 300);
        if episode.status == GameStatus::Lose {
            assert_eq!(episode.score, 0);
        }
    }
}

#[test]
fn test_trained_table_survives_save_and_load() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = ModelStore::new(temp_dir.path());
    let mut trainer = Trainer::new(level1(), GameConfig::seeded(8));
    trainer.max_ticks = Some(200);
    let mut learner = QLearningAgent::new(learning_config());
    trainer.train(&mut learner, 10).unwrap();

    store.save("level1", learner.table()).unwrap();
    let loaded = store.load("level1").unwrap();

    assert_eq!(&loaded, learner.table());
    assert_eq!(loaded.len(), learner.table().len());
    for (state, action, value) in learner.table().iter() {
        assert_eq!(loaded.get(state, action), value);
    }
    let blob = learner.table().to_bytes().unwrap();
    assert_eq!(&QTable::from_bytes(&blob).unwrap(), learner.table());
}

#[test]
fn test_missing_model_can_fall_back_to_empty_table() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = ModelStore::new(temp_dir.path());

    match store.load("level1") {
        Err(PacmanError::ModelNotFound { map_id, path }) => {
            assert_eq!(map_id, "level1");
            assert!(path.starts_with(temp_dir.path()));
        }
        other => panic!("expected ModelNotFound, got {other:?}"),
    }

    let table = store.load_or_default("level1").unwrap();
    let mut learner = QLearningAgent::with_table(learning_config(), table);
    let mut session =
        GameSession::initialize(level1(), PlayerSetup::learner(), GameConfig::seeded(1)).unwrap();
    let step = session.learning_step(&mut learner).unwrap().unwrap();
    assert_eq!(step.outcome.reward, session.score());
    assert_eq!(learner.table().len(), 1);
}

#[test]
fn test_learning_resumes_from_a_loaded_table() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = ModelStore::new(temp_dir.path());
    let mut trainer = Trainer::new(level1(), GameConfig::seeded(2));
    trainer.max_ticks = Some(200);

    let mut first = QLearningAgent::new(learning_config());
    trainer.train(&mut first, 5).unwrap();
    let size = first.table().len();
    store.save("level1", first.table()).unwrap();

    let mut resumed = QLearningAgent::with_table(learning_config(), store.load("level1").unwrap());
    assert_eq!(resumed.table().len(), size);
    trainer.train(&mut resumed, 5).unwrap();
    assert!(resumed.table().len() >= size);
}
