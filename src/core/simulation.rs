//! The iteration driver: a [`Network`] paired with an [`UpdateSequence`],
//! stepped one iteration at a time.
//!
//! One iteration runs every action in the sequence, in order. The driver is
//! synchronous; async batch-and-notify lives in the daemon, which owns a
//! `Simulation` behind a lock and steps it from a background task.

use crate::network::Network;
use crate::schedule::{BufferedUpdate, UpdateError, UpdateSequence};

/// A network plus the ordered actions that define its iteration.
pub struct Simulation {
    network: Network,
    actions: UpdateSequence,
    iterations: u64,
}

impl Simulation {
    /// Empty network with the default discipline ("Buffered update")
    /// installed as the sole action.
    pub fn new() -> Self {
        let mut actions = UpdateSequence::new();
        actions.add(BufferedUpdate);
        Self {
            network: Network::new(),
            actions,
            iterations: 0,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn actions(&self) -> &UpdateSequence {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut UpdateSequence {
        &mut self.actions
    }

    /// Completed iterations since construction. Failed iterations do not
    /// count.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Run the sequence once. The counter advances only if every action
    /// succeeded.
    pub fn update(&mut self) -> Result<(), UpdateError> {
        self.actions.invoke_all(&mut self.network)?;
        self.iterations += 1;
        Ok(())
    }

    /// Run `n` iterations, stopping at the first error.
    pub fn iterate(&mut self, n: u64) -> Result<(), UpdateError> {
        for _ in 0..n {
            self.update()?;
        }
        Ok(())
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::update_action;
    use crate::trainer::{PredictionTrainer, TrainerConfig};

    #[test]
    fn new_installs_the_buffered_discipline() {
        let sim = Simulation::new();
        assert_eq!(sim.actions().names(), vec!["Buffered update"]);
        assert_eq!(sim.iterations(), 0);
    }

    #[test]
    fn iterate_runs_the_sequence_n_times() {
        let mut sim = Simulation::new();
        sim.network_mut().add_neuron();
        sim.actions_mut().add(update_action("tally", |net: &mut Network| {
            net.neuron_mut(0).aux_value += 1.0;
            Ok(())
        }));
        sim.iterate(5).unwrap();
        assert_eq!(sim.network().neuron(0).aux_value, 5.0);
        assert_eq!(sim.iterations(), 5);
    }

    #[test]
    fn failed_iterations_do_not_advance_the_counter() {
        let mut sim = Simulation::new();
        sim.network_mut().add_neuron();
        let mut calls = 0u32;
        sim.actions_mut().add(update_action("Flaky", move |_: &mut Network| {
            calls += 1;
            if calls == 3 {
                Err(UpdateError::InvalidConfig {
                    reason: "third call fails",
                })
            } else {
                Ok(())
            }
        }));
        let err = sim.iterate(10).unwrap_err();
        assert!(matches!(err, UpdateError::ActionFailed { .. }));
        assert_eq!(sim.iterations(), 2);
    }

    /// End-to-end: a sensory/actions/prediction rig shaped like the demo
    /// world, trained online. Prediction error starts at 1.0 and decays
    /// toward zero as the fed synapse learns to reproduce the clamped
    /// sensory pattern.
    #[test]
    fn prediction_error_declines_over_training() {
        let mut sim = Simulation::new();
        let net = sim.network_mut();
        let sensory = net.add_neuron_group(3);
        let actions = net.add_neuron_group(3);
        let prediction = net.add_neuron_group(3);
        net.group_mut(sensory).label = "Sensory".into();
        net.group_mut(actions).label = "Actions".into();
        net.group_mut(prediction).label = "Predicted".into();
        net.connect_all_to_all(sensory, prediction, 0.0);
        net.connect_all_to_all(actions, prediction, 0.0);
        let error = net.add_neuron();
        net.neuron_mut(error).label = "Error".into();
        net.set_clamped(error, true);
        net.set_group_clamped(sensory, true);
        net.set_group_clamped(actions, true);
        net.set_group_activations(sensory, &[1.0, 0.0, 0.0]);

        let trainer =
            PredictionTrainer::new(net, sensory, prediction, error, TrainerConfig::default())
                .unwrap();
        sim.actions_mut().add(trainer);

        sim.update().unwrap();
        let first = sim.network().neuron(error).activation;
        assert!((first - 1.0).abs() < 1e-9, "first-pass error was {first}");

        sim.iterate(59).unwrap();
        let last = sim.network().neuron(error).activation;
        assert!(last < 0.01, "error failed to decline: {last}");
        let predicted = sim.network().group_activations(prediction);
        assert!(
            (predicted[0] - 1.0).abs() < 0.1,
            "prediction did not converge: {predicted:?}"
        );
    }
}
