use smart_energy_scheduler::domain::{Appliance, Preference, Preferences, PriceSeries, RestrictedHours, SchedulingContext};
use smart_energy_scheduler::engine::{run_scheduler, schedule_cost, solve_exact, train_scheduler};
use smart_energy_scheduler::ml::{PolicyHandle, PolicyTrainer, TrainingConfig};
use smart_energy_scheduler::simulation::EnvironmentConfig;
use smart_energy_scheduler::SchedulingError;

fn request() -> (PriceSeries, Vec<Appliance>, RestrictedHours, Preferences) {
    let prices = PriceSeries::new(vec![0.30, 0.28, 0.12, 0.10, 0.08, 0.25, 0.30, 0.09]).unwrap();
    let appliances = vec![Appliance::new("Washer", 1.0, 2), Appliance::new("Dryer", 2.5, 1)];
    let restricted: RestrictedHours = [4].into_iter().collect();
    let preferences = Preferences::from([(
        "Washer".to_string(),
        Preference {
            avoid_hours: [0, 1].into_iter().collect(),
            ..Preference::default()
        },
    )]);
    (prices, appliances, restricted, preferences)
}

#[test]
fn trained_schedule_is_complete_and_never_beats_exact() {
    let (prices, appliances, restricted, preferences) = request();
    let policy = train_scheduler(&prices, &appliances, &restricted, &preferences).unwrap();
    let schedule = run_scheduler(&policy, &prices, &appliances, &restricted, &preferences).unwrap();

    assert!(schedule.is_feasible(&appliances, &restricted));
    let learned_cost = schedule_cost(&schedule, &prices, &appliances).unwrap();
    let (_, exact_cost) = solve_exact(&prices, &appliances, &restricted).unwrap();
    assert!(learned_cost >= exact_cost - 1e-9);
}

#[test]
fn degenerate_rollout_is_reported_with_partial_schedule() {
    let (prices, appliances, restricted, preferences) = request();
    let ctx = SchedulingContext::new(prices.clone(), appliances.clone(), restricted.clone(), preferences.clone()).unwrap();
    let mut handle = PolicyHandle::untrained(&ctx);
    handle.policy.set_bias(0, -4.0);

    match run_scheduler(&handle, &prices, &appliances, &restricted, &preferences) {
        Err(SchedulingError::DegenerateSchedule { shortfalls, partial }) => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].appliance, "Washer");
            assert_eq!(shortfalls[0].required, 2);
            assert_eq!(partial.hours_vec("Dryer"), vec![0]);
        }
        other => panic!("expected a degenerate schedule, got {other:?}"),
    }
}

#[test]
fn saved_policy_reproduces_schedule() {
    let (prices, appliances, restricted, preferences) = request();
    let ctx = SchedulingContext::new(prices, appliances, restricted, preferences).unwrap();
    let trainer = PolicyTrainer::new(
        TrainingConfig::default().with_episodes(100).with_seed(11),
        EnvironmentConfig::default(),
    );
    let handle = trainer.train(&ctx).unwrap();

    let dir = std::env::temp_dir().join(format!("ses-learned-{}", uuid::Uuid::new_v4()));
    let path = dir.join("policy.json");
    handle.save(&path).unwrap();
    let loaded = PolicyHandle::load(&path).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    let env = EnvironmentConfig::default();
    let before = smart_energy_scheduler::ml::run_policy(&handle, &ctx, &env).unwrap();
    let after = smart_energy_scheduler::ml::run_policy(&loaded, &ctx, &env).unwrap();
    assert_eq!(before, after);
}

#[test]
fn policy_for_other_request_is_rejected() {
    let (prices, appliances, restricted, preferences) = request();
    let ctx = SchedulingContext::new(prices.clone(), appliances[..1].to_vec(), restricted.clone(), preferences.clone()).unwrap();
    let handle = PolicyHandle::untrained(&ctx);

    let err = run_scheduler(&handle, &prices, &appliances, &restricted, &preferences).unwrap_err();
    assert_eq!(err.kind(), "MalformedInput");
}
