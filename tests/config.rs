mod common;

use common::{learner, Stream};
use warmcb::{
    lambda_grid, ExplorationConfig, LambdaScheme, SelectorRule, WarmCb, WarmCbConfig,
    WarmCbError, Weighting,
};

const FULL: &str = r#"
num_actions = 3
warm_start_period = 40
interaction_period = 160
lambda_candidates = [1.0, 0.0, 0.5, 0.5]
corruption_probability = 0.1
probability_floor = 0.01
random_seed = 17
warm_start_learning_rate = 0.5
interaction_learning_rate = 2.0
weighting = "balanced"
warm_start_prediction = "selector"
warm_start_type = "bandit"

[interleave]
interaction_block = 20
warm_start_block = 10

[exploration]
strategy = "bag"
size = 3
epsilon = 0.1

[selector]
rule = "exp3-ix"
decay = 0.99
min_probability = 0.01
max_cost = 2.0

[warm_start_corruption]
kind = "uniform"
probability = 0.1
"#;

#[test]
fn every_option_parses_and_runs() {
    let cfg = WarmCbConfig::from_toml_str(FULL).unwrap();
    assert_eq!(cfg.weighting, Weighting::Balanced);
    assert_eq!(cfg.selector.rule, SelectorRule::Exp3Ix);
    assert_eq!(cfg.exploration, ExplorationConfig::Bag { size: 3, epsilon: 0.1 });

    let mut cb = WarmCb::new(cfg, learner(2)).unwrap();
    // Duplicates dropped, ascending.
    assert_eq!(cb.lambdas(), vec![0.0, 0.5, 1.0]);

    let mut stream = Stream::new(0, 2, 1);
    for _ in 0..400 {
        cb.process(&stream.labeled());
    }
    let stats = *cb.stats();
    assert_eq!(stats.warm_start_examples + stats.interaction_examples, 400);
    // Interleaved blocks re-enter interaction more than once.
    assert!(stats.transitions > 1);
    // Interaction budget caps learning.
    assert!(stats.interaction_learned <= 160);
}

#[test]
fn unknown_exploration_name_fails_setup() {
    assert!(matches!(
        ExplorationConfig::from_name("thompson"),
        Err(WarmCbError::UnknownExploration(name)) if name == "thompson"
    ));
    let cfg = WarmCbConfig {
        exploration: ExplorationConfig::from_name("cover").unwrap(),
        ..WarmCbConfig::default()
    };
    assert!(WarmCb::new(cfg, learner(2)).is_ok());
}

#[test]
fn negative_periods_are_rejected_at_parse_time() {
    for bad in ["warm_start_period = -1", "interaction_period = -10"] {
        assert!(
            matches!(WarmCbConfig::from_toml_str(bad), Err(WarmCbError::Config(_))),
            "{bad}"
        );
    }
}

#[test]
fn balanced_grid_feeds_the_config() {
    let grid = lambda_grid(5, LambdaScheme::BalancedWithEndpoints, 100, 300);
    assert_eq!(grid.first(), Some(&0.0));
    assert_eq!(grid.last(), Some(&1.0));
    assert_eq!(grid[2], 0.75);
    let cfg = WarmCbConfig {
        lambda_candidates: grid,
        ..WarmCbConfig::default()
    };
    cfg.validate().unwrap();
}
