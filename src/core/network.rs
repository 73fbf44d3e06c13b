//! The model graph: neurons, synapses, neuron groups, synapse groups, neuron
//! arrays and weight matrices, plus the update entry points the scheduling
//! actions are built on (buffered two-phase, priority-ordered, per-model).

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::prng::Prng;
use crate::schedule::UpdateError;

pub type NeuronId = usize;
pub type SynapseId = usize;
pub type GroupId = usize;
pub type SynapseGroupId = usize;
pub type ArrayId = usize;
pub type MatrixId = usize;

/// Neuron count at or above which the buffered phase-1 pass runs on rayon
/// when the `parallel` feature is enabled.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 4096;

/// A scalar unit. Activation is the committed state; `buffer` stages the next
/// value during a buffered pass; `input` accumulates external drive and is
/// consumed (and cleared) by whichever update pass visits the neuron next.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Neuron {
    pub activation: f64,
    pub buffer: f64,
    pub input: f64,
    /// Scratch scalar repurposed by update actions to carry transient
    /// per-neuron signals (e.g. prediction error) between passes.
    pub aux_value: f64,
    pub bias: f64,
    /// Ordering key for the priority discipline; lower updates earlier.
    pub priority: i32,
    /// Clamped neurons ignore normal update passes; only
    /// [`Network::force_set_activation`] (or a direct activation write)
    /// changes them.
    pub clamped: bool,
    pub label: String,
    group: Option<GroupId>,
}

impl Neuron {
    /// Group this neuron belongs to, if any. Loose neurons return `None`.
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }
}

/// A directed weighted edge. Endpoints are non-owning ids; removing a synapse
/// never touches its endpoints.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Synapse {
    pub source: NeuronId,
    pub target: NeuronId,
    pub strength: f64,
    /// Frozen synapses ignore strength writes, including learning updates.
    pub frozen: bool,
    group: Option<SynapseGroupId>,
}

impl Synapse {
    /// Synapse group this synapse belongs to, if any.
    pub fn group(&self) -> Option<SynapseGroupId> {
        self.group
    }
}

/// Ordered collection of neurons with a vector view over their activations.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NeuronGroup {
    pub label: String,
    neurons: Vec<NeuronId>,
}

impl NeuronGroup {
    pub fn neurons(&self) -> &[NeuronId] {
        &self.neurons
    }

    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }
}

/// Ordered collection of synapses created all-to-all between two neuron
/// groups. Members are static: strengths change only through learning actions
/// or explicit writes, so the group itself has nothing to advance per tick.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SynapseGroup {
    pub label: String,
    pub source_group: GroupId,
    pub target_group: GroupId,
    synapses: Vec<SynapseId>,
}

impl SynapseGroup {
    pub fn synapses(&self) -> &[SynapseId] {
        &self.synapses
    }

    pub fn len(&self) -> usize {
        self.synapses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synapses.is_empty()
    }
}

/// Vectorized population: parallel activation/input vectors updated as a
/// block. Integration is the identity rule — an update moves accumulated
/// inputs into activations and clears them.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NeuronArray {
    pub label: String,
    pub activations: Vec<f64>,
    pub inputs: Vec<f64>,
    buffer: Vec<f64>,
}

impl NeuronArray {
    pub fn len(&self) -> usize {
        self.activations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }
}

/// Dense connector between two neuron arrays.
///
/// Row-major: `rows = target len`, `cols = source len`; entry `(r, c)` scales
/// source activation `c` into target input `r`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeightMatrix {
    pub source: ArrayId,
    pub target: ArrayId,
    weights: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl WeightMatrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.weights[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.weights[row * self.cols + col] = value;
    }

    /// Zero the matrix and set ones on the main diagonal.
    pub fn diagonal(&mut self) {
        self.weights.fill(0.0);
        for i in 0..self.rows.min(self.cols) {
            self.weights[i * self.cols + i] = 1.0;
        }
    }

    pub fn randomize(&mut self, prng: &mut Prng, low: f64, high: f64) {
        for w in &mut self.weights {
            *w = prng.gen_range_f64(low, high);
        }
    }

    /// `W · src` for a source activation slice of length `cols`.
    fn product(&self, src: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.rows];
        for (r, o) in out.iter_mut().enumerate() {
            let row = &self.weights[r * self.cols..(r + 1) * self.cols];
            *o = row.iter().zip(src).map(|(w, a)| w * a).sum();
        }
        out
    }
}

/// Addresses a single model for a per-model update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ModelKey {
    Neuron(NeuronId),
    Synapse(SynapseId),
    Group(GroupId),
    SynapseGroup(SynapseGroupId),
    Array(ArrayId),
    Matrix(MatrixId),
}

impl ModelKey {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelKey::Neuron(_) => "neuron",
            ModelKey::Synapse(_) => "synapse",
            ModelKey::Group(_) => "neuron group",
            ModelKey::SynapseGroup(_) => "synapse group",
            ModelKey::Array(_) => "neuron array",
            ModelKey::Matrix(_) => "weight matrix",
        }
    }

    pub fn id(&self) -> usize {
        match *self {
            ModelKey::Neuron(id)
            | ModelKey::Synapse(id)
            | ModelKey::Group(id)
            | ModelKey::SynapseGroup(id)
            | ModelKey::Array(id)
            | ModelKey::Matrix(id) => id,
        }
    }
}

/// The mutable graph all update actions operate on.
///
/// Ids are dense indices issued by the `add_*` methods and are only valid for
/// the network that issued them; passing a foreign id panics like any other
/// out-of-range index. Neurons, groups, arrays and matrices are never
/// removed. Synapses can be removed; their ids are tombstoned, never reused.
#[derive(Debug, Clone, Default)]
pub struct Network {
    neurons: Vec<Neuron>,
    synapses: Vec<Option<Synapse>>,
    groups: Vec<NeuronGroup>,
    synapse_groups: Vec<SynapseGroup>,
    arrays: Vec<NeuronArray>,
    matrices: Vec<WeightMatrix>,
    fan_in: Vec<Vec<SynapseId>>,
    fan_out: Vec<Vec<SynapseId>>,
    revision: u64,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic topology counter. Bumped by every structural mutation
    /// (adding models, removing synapses); callers that cache derived views
    /// of the graph compare against it to decide when to rebuild.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ---- construction ----------------------------------------------------

    pub fn add_neuron(&mut self) -> NeuronId {
        let id = self.neurons.len();
        self.neurons.push(Neuron::default());
        self.fan_in.push(Vec::new());
        self.fan_out.push(Vec::new());
        self.revision += 1;
        id
    }

    /// Create `count` fresh neurons and collect them into a new group.
    pub fn add_neuron_group(&mut self, count: usize) -> GroupId {
        let gid = self.groups.len();
        let mut members = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.add_neuron();
            self.neurons[id].group = Some(gid);
            members.push(id);
        }
        self.groups.push(NeuronGroup {
            label: String::new(),
            neurons: members,
        });
        self.revision += 1;
        gid
    }

    pub fn add_synapse(&mut self, source: NeuronId, target: NeuronId, strength: f64) -> SynapseId {
        assert!(
            source < self.neurons.len() && target < self.neurons.len(),
            "synapse endpoints must belong to this network"
        );
        let id = self.synapses.len();
        self.synapses.push(Some(Synapse {
            source,
            target,
            strength,
            frozen: false,
            group: None,
        }));
        self.fan_in[target].push(id);
        self.fan_out[source].push(id);
        self.revision += 1;
        id
    }

    /// Remove a synapse. Endpoints are untouched; the id is never reused.
    /// Returns false if the id was already removed or never existed.
    pub fn remove_synapse(&mut self, id: SynapseId) -> bool {
        let Some(slot) = self.synapses.get_mut(id) else {
            return false;
        };
        let Some(syn) = slot.take() else {
            return false;
        };
        self.fan_in[syn.target].retain(|&s| s != id);
        self.fan_out[syn.source].retain(|&s| s != id);
        if let Some(gid) = syn.group {
            self.synapse_groups[gid].synapses.retain(|&s| s != id);
        }
        self.revision += 1;
        true
    }

    /// Connect every source-group neuron to every target-group neuron with
    /// loose synapses initialized to `strength`. Returns the new ids in
    /// source-major order.
    pub fn connect_all_to_all(
        &mut self,
        source: GroupId,
        target: GroupId,
        strength: f64,
    ) -> Vec<SynapseId> {
        let pairs: Vec<(NeuronId, NeuronId)> = self.groups[source]
            .neurons
            .iter()
            .flat_map(|&s| self.groups[target].neurons.iter().map(move |&t| (s, t)))
            .collect();
        pairs
            .into_iter()
            .map(|(s, t)| self.add_synapse(s, t, strength))
            .collect()
    }

    /// All-to-all like [`connect_all_to_all`], but the synapses are owned by
    /// a new [`SynapseGroup`].
    pub fn add_synapse_group(
        &mut self,
        source: GroupId,
        target: GroupId,
        strength: f64,
    ) -> SynapseGroupId {
        let gid = self.synapse_groups.len();
        self.synapse_groups.push(SynapseGroup {
            label: String::new(),
            source_group: source,
            target_group: target,
            synapses: Vec::new(),
        });
        let ids = self.connect_all_to_all(source, target, strength);
        for &sid in &ids {
            if let Some(s) = &mut self.synapses[sid] {
                s.group = Some(gid);
            }
        }
        self.synapse_groups[gid].synapses = ids;
        self.revision += 1;
        gid
    }

    pub fn add_neuron_array(&mut self, size: usize) -> ArrayId {
        let id = self.arrays.len();
        self.arrays.push(NeuronArray {
            label: String::new(),
            activations: vec![0.0; size],
            inputs: vec![0.0; size],
            buffer: vec![0.0; size],
        });
        self.revision += 1;
        id
    }

    /// Zero-initialized matrix shaped `target len × source len`.
    pub fn add_weight_matrix(&mut self, source: ArrayId, target: ArrayId) -> MatrixId {
        let rows = self.arrays[target].len();
        let cols = self.arrays[source].len();
        let id = self.matrices.len();
        self.matrices.push(WeightMatrix {
            source,
            target,
            weights: vec![0.0; rows * cols],
            rows,
            cols,
        });
        self.revision += 1;
        id
    }

    // ---- accessors -------------------------------------------------------

    pub fn neuron(&self, id: NeuronId) -> &Neuron {
        &self.neurons[id]
    }

    pub fn neuron_mut(&mut self, id: NeuronId) -> &mut Neuron {
        &mut self.neurons[id]
    }

    pub fn neuron_count(&self) -> usize {
        self.neurons.len()
    }

    pub fn neuron_ids(&self) -> core::ops::Range<NeuronId> {
        0..self.neurons.len()
    }

    /// Live synapse lookup; removed ids return `None`.
    pub fn synapse(&self, id: SynapseId) -> Option<&Synapse> {
        self.synapses.get(id).and_then(|s| s.as_ref())
    }

    pub fn synapse_mut(&mut self, id: SynapseId) -> Option<&mut Synapse> {
        self.synapses.get_mut(id).and_then(|s| s.as_mut())
    }

    /// Live synapse count.
    pub fn synapse_count(&self) -> usize {
        self.synapses.iter().filter(|s| s.is_some()).count()
    }

    /// Every live synapse id — loose and grouped alike — in insertion order.
    pub fn flat_synapse_list(&self) -> Vec<SynapseId> {
        self.synapses
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }

    /// Ids of synapses feeding `id`.
    pub fn fan_in(&self, id: NeuronId) -> &[SynapseId] {
        &self.fan_in[id]
    }

    /// Ids of synapses leaving `id`.
    pub fn fan_out(&self, id: NeuronId) -> &[SynapseId] {
        &self.fan_out[id]
    }

    pub fn group(&self, id: GroupId) -> &NeuronGroup {
        &self.groups[id]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut NeuronGroup {
        &mut self.groups[id]
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_ids(&self) -> core::ops::Range<GroupId> {
        0..self.groups.len()
    }

    /// First group carrying `label`, if any.
    pub fn find_group(&self, label: &str) -> Option<GroupId> {
        self.groups.iter().position(|g| g.label == label)
    }

    pub fn synapse_group(&self, id: SynapseGroupId) -> &SynapseGroup {
        &self.synapse_groups[id]
    }

    pub fn synapse_group_count(&self) -> usize {
        self.synapse_groups.len()
    }

    pub fn array(&self, id: ArrayId) -> &NeuronArray {
        &self.arrays[id]
    }

    pub fn array_mut(&mut self, id: ArrayId) -> &mut NeuronArray {
        &mut self.arrays[id]
    }

    pub fn array_count(&self) -> usize {
        self.arrays.len()
    }

    pub fn matrix(&self, id: MatrixId) -> &WeightMatrix {
        &self.matrices[id]
    }

    pub fn matrix_mut(&mut self, id: MatrixId) -> &mut WeightMatrix {
        &mut self.matrices[id]
    }

    pub fn matrix_count(&self) -> usize {
        self.matrices.len()
    }

    // ---- group views -----------------------------------------------------

    pub fn group_neurons(&self, id: GroupId) -> &[NeuronId] {
        self.groups[id].neurons()
    }

    /// Member activations in member order.
    pub fn group_activations(&self, id: GroupId) -> Vec<f64> {
        self.groups[id]
            .neurons
            .iter()
            .map(|&n| self.neurons[n].activation)
            .collect()
    }

    /// Write through to member activations in order. Clamped members are
    /// written too (setting the view force-sets them). Panics on length
    /// mismatch: the view length always equals the member count.
    pub fn set_group_activations(&mut self, id: GroupId, values: &[f64]) {
        let members = self.groups[id].neurons.clone();
        assert_eq!(
            values.len(),
            members.len(),
            "activation vector length must match group size"
        );
        for (&n, &v) in members.iter().zip(values) {
            self.neurons[n].activation = v;
        }
    }

    pub fn group_aux_values(&self, id: GroupId) -> Vec<f64> {
        self.groups[id]
            .neurons
            .iter()
            .map(|&n| self.neurons[n].aux_value)
            .collect()
    }

    pub fn set_group_aux_values(&mut self, id: GroupId, values: &[f64]) {
        let members = self.groups[id].neurons.clone();
        assert_eq!(
            values.len(),
            members.len(),
            "aux vector length must match group size"
        );
        for (&n, &v) in members.iter().zip(values) {
            self.neurons[n].aux_value = v;
        }
    }

    /// Accumulate external drive on one neuron; consumed by its next update.
    pub fn add_input(&mut self, id: NeuronId, value: f64) {
        self.neurons[id].input += value;
    }

    /// Accumulate external drive across a group, in member order.
    pub fn add_group_inputs(&mut self, id: GroupId, values: &[f64]) {
        let members = self.groups[id].neurons.clone();
        assert_eq!(
            values.len(),
            members.len(),
            "input vector length must match group size"
        );
        for (&n, &v) in members.iter().zip(values) {
            self.neurons[n].input += v;
        }
    }

    /// Set an activation regardless of clamping. The only sanctioned write
    /// path for reporting sinks like an error neuron.
    pub fn force_set_activation(&mut self, id: NeuronId, value: f64) {
        self.neurons[id].activation = value;
    }

    pub fn set_clamped(&mut self, id: NeuronId, clamped: bool) {
        self.neurons[id].clamped = clamped;
    }

    pub fn set_group_clamped(&mut self, id: GroupId, clamped: bool) {
        let members = self.groups[id].neurons.clone();
        for n in members {
            self.neurons[n].clamped = clamped;
        }
    }

    pub fn freeze_synapses(&mut self, frozen: bool) {
        for s in self.synapses.iter_mut().flatten() {
            s.frozen = frozen;
        }
    }

    // ---- randomization ---------------------------------------------------

    pub fn randomize_synapses(&mut self, prng: &mut Prng, low: f64, high: f64) {
        for s in self.synapses.iter_mut().flatten() {
            if !s.frozen {
                s.strength = prng.gen_range_f64(low, high);
            }
        }
    }

    /// Randomize activations of unclamped loose neurons.
    pub fn randomize_loose_neurons(&mut self, prng: &mut Prng, low: f64, high: f64) {
        for n in &mut self.neurons {
            if n.group.is_none() && !n.clamped {
                n.activation = prng.gen_range_f64(low, high);
            }
        }
    }

    // ---- update machinery ------------------------------------------------

    /// Weighted synaptic drive: Σ strength · source activation over fan-in.
    pub fn weighted_input(&self, id: NeuronId) -> f64 {
        self.fan_in[id]
            .iter()
            .filter_map(|&sid| self.synapses[sid].as_ref())
            .map(|s| s.strength * self.neurons[s.source].activation)
            .sum()
    }

    fn next_activation(&self, id: NeuronId) -> f64 {
        let n = &self.neurons[id];
        n.bias + n.input + self.weighted_input(id)
    }

    /// Direct-commit update of one neuron: compute the next activation from
    /// current state, commit it immediately, consume the accumulated input.
    /// Clamped neurons keep their activation but still consume input.
    pub fn update_neuron(&mut self, id: NeuronId) {
        if !self.neurons[id].clamped {
            let v = self.next_activation(id);
            self.neurons[id].activation = v;
        }
        self.neurons[id].input = 0.0;
    }

    /// `inputs[i] + Σ incoming W · src` for one array, from committed state.
    fn array_next(&self, id: ArrayId) -> Vec<f64> {
        let mut next = self.arrays[id].inputs.clone();
        for m in self.matrices.iter().filter(|m| m.target == id) {
            let product = m.product(&self.arrays[m.source].activations);
            for (n, v) in next.iter_mut().zip(product) {
                *n += v;
            }
        }
        next
    }

    /// Two-phase synchronous pass over every stateful model.
    ///
    /// Phase 1 stages each model's next value in its own buffer, reading only
    /// committed activations and the model's own accumulated input; phase 2
    /// commits every buffer and clears consumed inputs. The result is
    /// identical under any visitation order within either phase.
    pub fn buffered_update(&mut self) {
        // Phase 1: neurons.
        #[cfg(feature = "parallel")]
        {
            if self.neurons.len() >= PARALLEL_THRESHOLD {
                let next: Vec<f64> = (0..self.neurons.len())
                    .into_par_iter()
                    .map(|id| {
                        if self.neurons[id].clamped {
                            self.neurons[id].activation
                        } else {
                            self.next_activation(id)
                        }
                    })
                    .collect();
                for (n, v) in self.neurons.iter_mut().zip(next) {
                    n.buffer = v;
                }
            } else {
                self.stage_neuron_buffers();
            }
        }
        #[cfg(not(feature = "parallel"))]
        self.stage_neuron_buffers();

        // Phase 1: arrays.
        for id in 0..self.arrays.len() {
            let next = self.array_next(id);
            self.arrays[id].buffer = next;
        }

        // Phase 2: commit everything, consume inputs.
        for n in &mut self.neurons {
            if !n.clamped {
                n.activation = n.buffer;
            }
            n.input = 0.0;
        }
        for a in &mut self.arrays {
            a.activations.copy_from_slice(&a.buffer);
            a.inputs.fill(0.0);
        }
    }

    fn stage_neuron_buffers(&mut self) {
        for id in 0..self.neurons.len() {
            let v = if self.neurons[id].clamped {
                self.neurons[id].activation
            } else {
                self.next_activation(id)
            };
            self.neurons[id].buffer = v;
        }
    }

    /// Direct-commit pass over loose neurons in ascending priority order.
    ///
    /// Group members are excluded. Ties keep insertion (id) order, and the
    /// order is derived from current priorities on every call, so priority
    /// edits take effect on the next pass. Because commits are immediate, a
    /// later neuron observes an earlier neuron's fresh activation.
    pub fn update_neurons_by_priority(&mut self) {
        let mut loose: Vec<NeuronId> = (0..self.neurons.len())
            .filter(|&id| self.neurons[id].group.is_none())
            .collect();
        loose.sort_by_key(|&id| self.neurons[id].priority);
        for id in loose {
            self.update_neuron(id);
        }
    }

    /// Update every loose non-neuron model in the network's fixed kind
    /// order: neuron groups (members direct, in member order), then weight
    /// matrices (propagate into target inputs), then neuron arrays
    /// (integrate inputs). Matrices run before arrays so one pass moves data
    /// a full hop. Synapses are static and have nothing to advance.
    pub fn update_all_but_neurons(&mut self) {
        for gid in 0..self.groups.len() {
            self.update_group(gid);
        }
        for mid in 0..self.matrices.len() {
            self.propagate_matrix(mid);
        }
        for aid in 0..self.arrays.len() {
            self.integrate_array(aid);
        }
    }

    fn update_group(&mut self, id: GroupId) {
        let members = self.groups[id].neurons.clone();
        for n in members {
            self.update_neuron(n);
        }
    }

    /// Push `W · source activations` into the target array's inputs.
    fn propagate_matrix(&mut self, id: MatrixId) {
        let product = {
            let m = &self.matrices[id];
            m.product(&self.arrays[m.source].activations)
        };
        let target = self.matrices[id].target;
        for (inp, v) in self.arrays[target].inputs.iter_mut().zip(product) {
            *inp += v;
        }
    }

    /// Move an array's accumulated inputs into its activations and clear
    /// them.
    fn integrate_array(&mut self, id: ArrayId) {
        let a = &mut self.arrays[id];
        a.activations.copy_from_slice(&a.inputs);
        a.inputs.fill(0.0);
    }

    /// Update exactly one addressed model with this network as context.
    ///
    /// Unlike the direct methods, addressing here is data (a user-configured
    /// action sequence), so unknown or removed ids are runtime errors rather
    /// than panics.
    pub fn update_model(&mut self, key: ModelKey) -> Result<(), UpdateError> {
        let missing = || UpdateError::MissingModel {
            kind: key.kind(),
            id: key.id(),
        };
        match key {
            ModelKey::Neuron(id) => {
                if id >= self.neurons.len() {
                    return Err(missing());
                }
                self.update_neuron(id);
            }
            ModelKey::Synapse(id) => {
                // Static synapse: existence check only, no state to advance.
                if self.synapse(id).is_none() {
                    return Err(missing());
                }
            }
            ModelKey::Group(id) => {
                if id >= self.groups.len() {
                    return Err(missing());
                }
                self.update_group(id);
            }
            ModelKey::SynapseGroup(id) => {
                if id >= self.synapse_groups.len() {
                    return Err(missing());
                }
            }
            ModelKey::Array(id) => {
                if id >= self.arrays.len() {
                    return Err(missing());
                }
                self.integrate_array(id);
            }
            ModelKey::Matrix(id) => {
                if id >= self.matrices.len() {
                    return Err(missing());
                }
                self.propagate_matrix(id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "expected {b}, got {a}");
    }

    /// a → b → c chain with unit weights; a clamped at 1.0.
    fn unit_chain() -> (Network, NeuronId, NeuronId, NeuronId) {
        let mut net = Network::new();
        let a = net.add_neuron();
        let b = net.add_neuron();
        let c = net.add_neuron();
        net.add_synapse(a, b, 1.0);
        net.add_synapse(b, c, 1.0);
        net.neuron_mut(a).clamped = true;
        net.neuron_mut(a).activation = 1.0;
        (net, a, b, c)
    }

    #[test]
    fn buffered_update_reads_previous_iteration_state() {
        let (mut net, _a, b, c) = unit_chain();
        net.buffered_update();
        // b saw a's clamp, c saw b's pre-pass zero.
        assert_close(net.neuron(b).activation, 1.0);
        assert_close(net.neuron(c).activation, 0.0);
        net.buffered_update();
        assert_close(net.neuron(c).activation, 1.0);
    }

    #[test]
    fn buffered_update_is_insertion_order_invariant() {
        // Same ring topology assembled in two different insertion orders.
        let build = |order: [usize; 3]| {
            let mut net = Network::new();
            let mut ids = [0; 3];
            for &slot in &order {
                ids[slot] = net.add_neuron();
            }
            let [x, y, z] = ids;
            net.neuron_mut(x).label = "x".into();
            net.neuron_mut(y).label = "y".into();
            net.neuron_mut(z).label = "z".into();
            net.add_synapse(x, y, 0.5);
            net.add_synapse(y, z, -0.25);
            net.add_synapse(z, x, 0.75);
            net.neuron_mut(x).activation = 1.0;
            net.neuron_mut(y).activation = -2.0;
            net.neuron_mut(z).activation = 0.5;
            net
        };
        let mut first = build([0, 1, 2]);
        let mut second = build([2, 0, 1]);
        for _ in 0..5 {
            first.buffered_update();
            second.buffered_update();
        }
        for label in ["x", "y", "z"] {
            let f = first.neuron_ids().find(|&i| first.neuron(i).label == label);
            let s = second
                .neuron_ids()
                .find(|&i| second.neuron(i).label == label);
            assert_close(
                first.neuron(f.unwrap()).activation,
                second.neuron(s.unwrap()).activation,
            );
        }
    }

    #[test]
    fn clamped_neuron_ignores_update_but_force_set_writes() {
        let mut net = Network::new();
        let n = net.add_neuron();
        net.set_clamped(n, true);
        net.neuron_mut(n).activation = 0.7;
        net.add_input(n, 5.0);
        net.buffered_update();
        assert_close(net.neuron(n).activation, 0.7);
        // Consumed even while clamped.
        assert_close(net.neuron(n).input, 0.0);
        net.force_set_activation(n, 2.5);
        assert_close(net.neuron(n).activation, 2.5);
    }

    #[test]
    fn external_input_feeds_one_update_then_clears() {
        let mut net = Network::new();
        let n = net.add_neuron();
        net.add_input(n, 0.25);
        net.add_input(n, 0.25);
        net.buffered_update();
        assert_close(net.neuron(n).activation, 0.5);
        // No fresh input: the next pass decays to bias (zero).
        net.buffered_update();
        assert_close(net.neuron(n).activation, 0.0);
    }

    #[test]
    fn bias_persists_across_updates() {
        let mut net = Network::new();
        let n = net.add_neuron();
        net.neuron_mut(n).bias = 0.3;
        net.buffered_update();
        net.buffered_update();
        assert_close(net.neuron(n).activation, 0.3);
    }

    #[test]
    fn priority_update_commits_low_priority_first() {
        let (mut net, _a, b, c) = unit_chain();
        // Equal priorities: insertion order makes b commit before c, so c
        // observes b's fresh value within the same pass.
        net.update_neurons_by_priority();
        assert_close(net.neuron(b).activation, 1.0);
        assert_close(net.neuron(c).activation, 1.0);
    }

    #[test]
    fn priority_edits_reorder_the_next_pass() {
        let (mut net, _a, b, c) = unit_chain();
        // c now updates before b and sees only b's stale zero.
        net.neuron_mut(c).priority = -1;
        net.update_neurons_by_priority();
        assert_close(net.neuron(c).activation, 0.0);
        assert_close(net.neuron(b).activation, 1.0);
    }

    #[test]
    fn priority_pass_skips_group_members() {
        let mut net = Network::new();
        let gid = net.add_neuron_group(1);
        let member = net.group_neurons(gid)[0];
        let loose = net.add_neuron();
        net.add_input(member, 1.0);
        net.add_input(loose, 1.0);
        net.update_neurons_by_priority();
        assert_close(net.neuron(member).activation, 0.0);
        assert_close(net.neuron(member).input, 1.0);
        assert_close(net.neuron(loose).activation, 1.0);
    }

    #[test]
    fn group_activation_view_reads_and_writes_in_member_order() {
        let mut net = Network::new();
        let gid = net.add_neuron_group(3);
        net.set_group_activations(gid, &[0.1, 0.2, 0.3]);
        assert_eq!(net.group_activations(gid), vec![0.1, 0.2, 0.3]);
        // Clamped members are written through as well.
        net.set_group_clamped(gid, true);
        net.set_group_activations(gid, &[1.0, 2.0, 3.0]);
        assert_eq!(net.group_activations(gid), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    #[should_panic(expected = "length must match group size")]
    fn group_activation_view_rejects_length_mismatch() {
        let mut net = Network::new();
        let gid = net.add_neuron_group(2);
        net.set_group_activations(gid, &[1.0]);
    }

    #[test]
    fn flat_synapse_list_spans_loose_and_grouped() {
        let mut net = Network::new();
        let a = net.add_neuron_group(2);
        let b = net.add_neuron_group(2);
        let loose_src = net.add_neuron();
        let loose_tgt = net.add_neuron();
        net.add_synapse_group(a, b, 0.0);
        let loose = net.add_synapse(loose_src, loose_tgt, 0.5);
        let all = net.flat_synapse_list();
        assert_eq!(all.len(), 5);
        assert!(all.contains(&loose));
        assert_eq!(net.synapse_group(0).len(), 4);
    }

    #[test]
    fn remove_synapse_tombstones_and_updates_fans() {
        let mut net = Network::new();
        let a = net.add_neuron();
        let b = net.add_neuron();
        let s = net.add_synapse(a, b, 1.0);
        let before = net.revision();
        assert!(net.remove_synapse(s));
        assert!(net.synapse(s).is_none());
        assert!(net.fan_in(b).is_empty());
        assert!(net.fan_out(a).is_empty());
        assert!(net.revision() > before);
        // Second removal is a no-op.
        assert!(!net.remove_synapse(s));
        // The id is not reused.
        let s2 = net.add_synapse(a, b, 2.0);
        assert_ne!(s, s2);
    }

    #[test]
    fn matrix_propagates_then_array_integrates_in_kind_order() {
        let mut net = Network::new();
        let src = net.add_neuron_array(2);
        let tgt = net.add_neuron_array(2);
        let mid = net.add_weight_matrix(src, tgt);
        net.matrix_mut(mid).diagonal();
        net.matrix_mut(mid).set(0, 1, 0.5);
        net.array_mut(src).activations = vec![1.0, 2.0];
        net.update_all_but_neurons();
        // Row 0: 1·1 + 0.5·2, row 1: 1·2.
        assert_close(net.array(tgt).activations[0], 2.0);
        assert_close(net.array(tgt).activations[1], 2.0);
        assert_close(net.array(tgt).inputs[0], 0.0);
    }

    #[test]
    fn buffered_update_covers_arrays() {
        let mut net = Network::new();
        let src = net.add_neuron_array(1);
        let tgt = net.add_neuron_array(1);
        let mid = net.add_weight_matrix(src, tgt);
        net.matrix_mut(mid).set(0, 0, 2.0);
        net.array_mut(src).activations = vec![1.5];
        net.buffered_update();
        assert_close(net.array(tgt).activations[0], 3.0);
        // Source had no inputs, so its own next state is zero.
        assert_close(net.array(src).activations[0], 0.0);
    }

    #[test]
    fn per_model_update_touches_only_the_addressed_model() {
        let mut net = Network::new();
        let g1 = net.add_neuron_group(1);
        let g2 = net.add_neuron_group(1);
        let n1 = net.group_neurons(g1)[0];
        let n2 = net.group_neurons(g2)[0];
        net.add_input(n1, 1.0);
        net.add_input(n2, 1.0);
        net.update_model(ModelKey::Group(g1)).unwrap();
        assert_close(net.neuron(n1).activation, 1.0);
        assert_close(net.neuron(n2).activation, 0.0);
        assert_close(net.neuron(n2).input, 1.0);
    }

    #[test]
    fn per_model_update_rejects_unknown_ids() {
        let mut net = Network::new();
        let err = net.update_model(ModelKey::Group(3)).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::MissingModel {
                kind: "neuron group",
                id: 3
            }
        ));
        let a = net.add_neuron();
        let b = net.add_neuron();
        let s = net.add_synapse(a, b, 1.0);
        net.remove_synapse(s);
        assert!(net.update_model(ModelKey::Synapse(s)).is_err());
    }

    #[test]
    fn randomize_synapses_respects_bounds_and_frozen() {
        let mut net = Network::new();
        let a = net.add_neuron();
        let b = net.add_neuron();
        let free = net.add_synapse(a, b, 0.0);
        let frozen = net.add_synapse(a, b, 0.123);
        net.synapse_mut(frozen).unwrap().frozen = true;
        let mut prng = Prng::new(11);
        net.randomize_synapses(&mut prng, -0.5, 0.5);
        let w = net.synapse(free).unwrap().strength;
        assert!((-0.5..0.5).contains(&w));
        assert_close(net.synapse(frozen).unwrap().strength, 0.123);
    }

    #[test]
    fn weighted_input_sums_live_fan_in_only() {
        let mut net = Network::new();
        let a = net.add_neuron();
        let b = net.add_neuron();
        let t = net.add_neuron();
        net.neuron_mut(a).activation = 1.0;
        net.neuron_mut(b).activation = 1.0;
        net.add_synapse(a, t, 0.25);
        let dead = net.add_synapse(b, t, 10.0);
        net.remove_synapse(dead);
        assert_close(net.weighted_input(t), 0.25);
    }
}
