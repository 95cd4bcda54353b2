//! Listener notifications from the session helpers.

use itc_fit::{fit_experiment, ChannelListener, ErrorMethod, FitConfig, FitEvent};

use crate::test_helpers::{noisy_experiment, reference_parameters, NOISE_SD};

#[test]
fn test_channel_listener_receives_fit_and_progress_events() {
    let mut experiment = noisy_experiment(25.0, reference_parameters(), NOISE_SD, 31);
    let config = FitConfig::new()
        .with_error_method(ErrorMethod::BootstrapResiduals)
        .with_bootstrap_iterations(6)
        .with_max_parallelism(2)
        .with_seed(5);

    let (listener, receiver) = ChannelListener::bounded(64);
    let solution = fit_experiment(&mut experiment, &config, &listener).unwrap();

    let events: Vec<FitEvent> = receiver.try_iter().collect();
    assert!(matches!(events.first(), Some(FitEvent::FitFinished(c)) if *c == solution.convergence));

    let mut progress: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            FitEvent::IterationProgress { current, total } => {
                assert_eq!(*total, 6);
                Some(*current)
            }
            FitEvent::FitFinished(_) => None,
        })
        .collect();
    progress.sort_unstable();
    assert_eq!(progress, (1..=6).collect::<Vec<_>>());
}

#[test]
fn test_full_channel_does_not_stall_the_bootstrap() {
    let mut experiment = noisy_experiment(25.0, reference_parameters(), NOISE_SD, 32);
    let config = FitConfig::new()
        .with_error_method(ErrorMethod::BootstrapResiduals)
        .with_bootstrap_iterations(8)
        .with_seed(6);

    // Nobody drains the receiver while the fit runs
    let (listener, receiver) = ChannelListener::bounded(1);
    let solution = fit_experiment(&mut experiment, &config, &listener).unwrap();

    assert_eq!(receiver.try_iter().count(), 1);
    assert_eq!(solution.bootstrap_summary.map(|s| s.requested), Some(8));
}
