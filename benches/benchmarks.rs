criterion::criterion_main!(benches);
criterion::criterion_group! {
    name = benches;
    config = criterion::Criterion::default()
        .without_plots()
        .noise_threshold(3.0)
        .significance_level(0.01)
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(1));
    targets =
        parsing_payoff_expressions,
        evaluating_donation_matrix,
        overlaying_role_environments,
        judging_observed_games,
        updating_q_estimates,
        sampling_boltzmann_actions,
        sampling_replay_batches,
        stepping_imitation_dynamics,
        playing_learning_episodes,
}

fn parsing_payoff_expressions(c: &mut criterion::Criterion) {
    c.bench_function("parse a discriminator payoff expression", |b| {
        b.iter(|| Expr::try_from("beta-(beta+c)*r").unwrap())
    });
}

fn evaluating_donation_matrix(c: &mut criterion::Criterion) {
    c.bench_function("evaluate the donation payoff matrix", |b| {
        let mut matrix = PayoffMatrix::donation();
        matrix.set("b", 4.0);
        matrix.set("beta", 3.0);
        matrix.set("c", 1.0);
        matrix.set("gamma", 1.0);
        matrix.set("r", 0.5);
        b.iter(|| matrix.evaluate().unwrap())
    });
}

fn overlaying_role_environments(c: &mut criterion::Criterion) {
    c.bench_function("evaluate the donation matrix with role overlays", |b| {
        let mut matrix = PayoffMatrix::donation();
        matrix.set("b", 4.0);
        matrix.set("beta", 3.0);
        matrix.set("c", 1.0);
        matrix.set("gamma", 1.0);
        matrix.set("r", 0.5);
        let overlays = [
            std::collections::BTreeMap::from([("r".to_string(), 0.5)]),
            std::collections::BTreeMap::from([("r".to_string(), 1.0)]),
        ];
        b.iter(|| matrix.evaluate_for(&overlays).unwrap())
    });
}

fn judging_observed_games(c: &mut criterion::Criterion) {
    c.bench_function("judge an observed game", |b| {
        let mut norm = Norm::from_id(10);
        let gift = Action::new("C", 0);
        let back = Action::new("D", 1);
        b.iter(|| norm.reputation(&gift, &back, 0.1).unwrap())
    });
}

fn updating_q_estimates(c: &mut criterion::Criterion) {
    c.bench_function("apply a temporal-difference update", |b| {
        let mut table = QTable::new(&["0", "1"], &["C", "D"]);
        let transition = Transition::random();
        b.iter(|| table.update(&transition, 0.1, 0.9).unwrap())
    });
}

fn sampling_boltzmann_actions(c: &mut criterion::Criterion) {
    c.bench_function("draw a Boltzmann action", |b| {
        let mut table = QTable::new(&["0", "1"], &["C", "D"]);
        table.set("0", "C", 1.0).unwrap();
        table.set("0", "D", -1.0).unwrap();
        b.iter(|| table.boltzmann("0", 2.0).unwrap())
    });
}

fn sampling_replay_batches(c: &mut criterion::Criterion) {
    c.bench_function("sample a replay batch without replacement", |b| {
        let mut buffer = ReplayBuffer::new(4, 512);
        for _ in 0..512 {
            buffer.add(Role::Donor, 0, Transition::random());
        }
        b.iter(|| buffer.sample(Role::Donor, 0, 32))
    });
}

fn stepping_imitation_dynamics(c: &mut criterion::Criterion) {
    c.bench_function("step the imitation dynamics", |b| {
        let mut config = Config::default();
        config.population = 50;
        let mut engine = Evolution::new(config).unwrap();
        b.iter(|| engine.step().unwrap())
    });
}

fn playing_learning_episodes(c: &mut criterion::Criterion) {
    c.bench_function("play a 100-game learning episode", |b| {
        let mut config = Config::default();
        config.population = 10;
        config.steps = 100;
        config.batch = 16;
        let mut training = Training::new(config).unwrap();
        b.iter(|| training.episode().unwrap())
    });
}

use reciprocity::Arbitrary;
use reciprocity::config::Config;
use reciprocity::game::action::Action;
use reciprocity::game::role::Role;
use reciprocity::game::transition::Transition;
use reciprocity::learning::buffer::ReplayBuffer;
use reciprocity::learning::qtable::QTable;
use reciprocity::matrix::expr::Expr;
use reciprocity::matrix::matrix::PayoffMatrix;
use reciprocity::norm::Norm;
use reciprocity::population::fermi::Evolution;
use reciprocity::population::qlearning::Training;
