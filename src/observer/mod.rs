#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::simulation::Simulation;

/// A read-only view of what a simulation is doing.
///
/// Design intent:
/// - Observers can inspect but never mutate or steer the network.
/// - Snapshots are taken *on-demand* and may allocate; nothing here touches
///   the update loop.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkSnapshot {
    pub iterations: u64,
    pub revision: u64,
    pub neurons: usize,
    pub synapses: usize,
    pub synapse_groups: usize,
    pub arrays: usize,
    pub matrices: usize,
    pub groups: Vec<GroupSnapshot>,
    /// Loose neurons that carry a label, e.g. a designated error neuron.
    pub labeled_neurons: Vec<(String, f64)>,
    /// Update sequence contents, in execution order.
    pub actions: Vec<String>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupSnapshot {
    pub label: String,
    pub activations: Vec<f64>,
}

pub struct SimulationAdapter<'a> {
    sim: &'a Simulation,
}

impl<'a> SimulationAdapter<'a> {
    pub fn new(sim: &'a Simulation) -> Self {
        Self { sim }
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        let net = self.sim.network();
        let groups = net
            .group_ids()
            .map(|gid| GroupSnapshot {
                label: net.group(gid).label.clone(),
                activations: net.group_activations(gid),
            })
            .collect();
        let labeled_neurons = net
            .neuron_ids()
            .filter_map(|id| {
                let n = net.neuron(id);
                if n.group().is_none() && !n.label.is_empty() {
                    Some((n.label.clone(), n.activation))
                } else {
                    None
                }
            })
            .collect();

        NetworkSnapshot {
            iterations: self.sim.iterations(),
            revision: net.revision(),
            neurons: net.neuron_count(),
            synapses: net.synapse_count(),
            synapse_groups: net.synapse_group_count(),
            arrays: net.array_count(),
            matrices: net.matrix_count(),
            groups,
            labeled_neurons,
            actions: self
                .sim
                .actions()
                .names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Activations of the group with the given label, if one exists.
    pub fn probe(&self, label: &str) -> Option<Vec<f64>> {
        let net = self.sim.network();
        net.find_group(label).map(|gid| net.group_activations(gid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled_sim() -> Simulation {
        let mut sim = Simulation::new();
        let net = sim.network_mut();
        let g = net.add_neuron_group(2);
        net.group_mut(g).label = "Sensory".into();
        net.set_group_activations(g, &[0.5, -0.5]);
        let e = net.add_neuron();
        net.neuron_mut(e).label = "Error".into();
        net.force_set_activation(e, 0.25);
        sim
    }

    #[test]
    fn snapshot_reflects_structure_and_state() {
        let sim = labeled_sim();
        let snap = SimulationAdapter::new(&sim).snapshot();
        assert_eq!(snap.neurons, 3);
        assert_eq!(snap.groups.len(), 1);
        assert_eq!(snap.groups[0].label, "Sensory");
        assert_eq!(snap.groups[0].activations, vec![0.5, -0.5]);
        assert_eq!(snap.labeled_neurons, vec![("Error".to_string(), 0.25)]);
        assert_eq!(snap.actions, vec!["Buffered update"]);
    }

    #[test]
    fn probe_resolves_group_labels() {
        let sim = labeled_sim();
        let adapter = SimulationAdapter::new(&sim);
        assert_eq!(adapter.probe("Sensory"), Some(vec![0.5, -0.5]));
        assert_eq!(adapter.probe("Motor"), None);
    }
}
