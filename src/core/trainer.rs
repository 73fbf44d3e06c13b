//! Online delta-rule prediction trainer: trains the synapses feeding a
//! "prediction" population so its activations forecast a "sensory"
//! population one step ahead, reporting root-sum-square error through a
//! designated error neuron.

use hashbrown::{HashMap, HashSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::network::{GroupId, Network, NeuronId, SynapseId};
use crate::schedule::{UpdateAction, UpdateError};

/// Which synapses the weight pass visits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SynapseScope {
    /// Walk the network's full flat synapse list. Safe despite its breadth:
    /// the per-pass error map contributes a zero delta for any target outside
    /// the prediction population.
    #[default]
    Global,
    /// Walk only the cached synapses whose target lies in the prediction
    /// population. Same weight changes as `Global`, smaller walk.
    Scoped,
}

/// Trainer knobs. `learning_rate` is fixed for the action's lifetime.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub scope: SynapseScope,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            scope: SynapseScope::Global,
        }
    }
}

impl TrainerConfig {
    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn scoped(mut self) -> Self {
        self.scope = SynapseScope::Scoped;
        self
    }

    /// Validate the configuration, returning an error message if invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err("learning_rate must be finite and > 0");
        }
        Ok(())
    }
}

/// The learning rule action.
///
/// Persistent state across invocations: `last_prediction`, the prediction
/// population's activations as they stood before the current pass (snapshot
/// taken at construction, overwritten after every successful pass), and a
/// scratch error map (neuron id → error) fully overwritten each pass. The
/// map, not neuron `aux_value`, is what the weight pass reads; `aux_value`
/// is written as the public per-neuron error view.
pub struct PredictionTrainer {
    sensory: GroupId,
    prediction: GroupId,
    error_neuron: NeuronId,
    config: TrainerConfig,
    last_prediction: Vec<f64>,
    errors: HashMap<NeuronId, f64>,
    scoped_synapses: Vec<SynapseId>,
    seen_revision: u64,
}

impl PredictionTrainer {
    /// Bind the trainer to its populations and error sink.
    ///
    /// Bindings must exist now; population sizes are checked again at every
    /// invocation, where a mismatch fails before any state is touched.
    pub fn new(
        network: &Network,
        sensory: GroupId,
        prediction: GroupId,
        error_neuron: NeuronId,
        config: TrainerConfig,
    ) -> Result<Self, UpdateError> {
        config
            .validate()
            .map_err(|reason| UpdateError::InvalidConfig { reason })?;
        for gid in [sensory, prediction] {
            if gid >= network.group_count() {
                return Err(UpdateError::MissingModel {
                    kind: "neuron group",
                    id: gid,
                });
            }
        }
        if error_neuron >= network.neuron_count() {
            return Err(UpdateError::MissingModel {
                kind: "neuron",
                id: error_neuron,
            });
        }
        Ok(Self {
            sensory,
            prediction,
            error_neuron,
            config,
            last_prediction: network.group_activations(prediction),
            errors: HashMap::new(),
            scoped_synapses: Self::collect_scoped(network, prediction),
            seen_revision: network.revision(),
        })
    }

    pub fn config(&self) -> TrainerConfig {
        self.config
    }

    /// The snapshot the next pass will compute errors against.
    pub fn last_prediction(&self) -> &[f64] {
        &self.last_prediction
    }

    /// Error recorded for a neuron in the most recent pass, if any.
    pub fn error(&self, id: NeuronId) -> Option<f64> {
        self.errors.get(&id).copied()
    }

    /// Synapses whose target lies in the prediction population, in flat-list
    /// order.
    fn collect_scoped(network: &Network, prediction: GroupId) -> Vec<SynapseId> {
        let targets: HashSet<NeuronId> = network.group_neurons(prediction).iter().copied().collect();
        network
            .flat_synapse_list()
            .into_iter()
            .filter(|&sid| {
                network
                    .synapse(sid)
                    .is_some_and(|s| targets.contains(&s.target))
            })
            .collect()
    }

    /// Rebuild the scoped cache after any topology change. Group membership
    /// is fixed at construction in this graph, so only the synapse set can
    /// drift.
    fn refresh_cache(&mut self, network: &Network) {
        if self.seen_revision == network.revision() {
            return;
        }
        self.scoped_synapses = Self::collect_scoped(network, self.prediction);
        self.seen_revision = network.revision();
    }
}

impl UpdateAction for PredictionTrainer {
    fn name(&self) -> &str {
        "Train prediction network"
    }

    fn description(&self) -> &str {
        "Delta-rule training of the synapses feeding the prediction population"
    }

    fn invoke(&mut self, network: &mut Network) -> Result<(), UpdateError> {
        self.refresh_cache(network);

        let sensory = network.group_activations(self.sensory);
        let members: Vec<NeuronId> = network.group_neurons(self.prediction).to_vec();
        // All checks precede all writes: a mismatch leaves weights, aux
        // values, the error neuron and the snapshot untouched.
        if sensory.len() != members.len() {
            return Err(UpdateError::PopulationSizeMismatch {
                sensory: sensory.len(),
                prediction: members.len(),
            });
        }

        self.errors.clear();
        let mut sse = 0.0;
        for (i, &nid) in members.iter().enumerate() {
            let e = sensory[i] - self.last_prediction[i];
            sse += e * e;
            self.errors.insert(nid, e);
            network.neuron_mut(nid).aux_value = e;
        }
        // Root-sum-square, not RMS: scales with population size.
        network.force_set_activation(self.error_neuron, sse.sqrt());

        let pass: Vec<SynapseId> = match self.config.scope {
            SynapseScope::Global => network.flat_synapse_list(),
            SynapseScope::Scoped => self.scoped_synapses.clone(),
        };
        for sid in pass {
            let Some(syn) = network.synapse(sid) else {
                continue;
            };
            if syn.frozen {
                continue;
            }
            let err = self.errors.get(&syn.target).copied().unwrap_or(0.0);
            let delta = self.config.learning_rate * network.neuron(syn.source).activation * err;
            if let Some(syn) = network.synapse_mut(sid) {
                syn.strength += delta;
            }
        }

        // Captured once, after the full weight pass, so the next iteration's
        // errors all use the same snapshot.
        self.last_prediction = network.group_activations(self.prediction);
        Ok(())
    }
}
