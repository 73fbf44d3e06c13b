//! # synfire
//!
//! The update scheduling and synaptic learning core of a neural simulation
//! workbench: a model graph of neurons, synapses, groups, arrays and weight
//! matrices, stepped by an ordered sequence of named update actions.
//!
//! Three update disciplines are built in (buffered two-phase,
//! priority-ordered, per-model), and arbitrary work — including online
//! learning — plugs into the same sequence as a named action.
//!
//! ## Quick Start
//!
//! ```
//! use synfire::prelude::*;
//!
//! // Two populations wired all-to-all, plus a clamped error readout.
//! let mut sim = Simulation::new();
//! let net = sim.network_mut();
//! let sensory = net.add_neuron_group(3);
//! let prediction = net.add_neuron_group(3);
//! net.connect_all_to_all(sensory, prediction, 0.0);
//! let error = net.add_neuron();
//! net.set_clamped(error, true);
//! net.set_group_clamped(sensory, true);
//! net.set_group_activations(sensory, &[1.0, 0.0, 0.0]);
//!
//! // Train the prediction online while the network runs.
//! let trainer = PredictionTrainer::new(
//!     net, sensory, prediction, error, TrainerConfig::default(),
//! ).unwrap();
//! sim.actions_mut().add(trainer);
//!
//! sim.iterate(100).unwrap();
//! assert!(sim.network().neuron(error).activation < 0.05);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): serialization support for network structures
//! - `parallel`: multi-threaded buffered staging via rayon
//!
//! ## Modules
//!
//! - [`network`]: the model graph and its update machinery
//! - [`schedule`]: named update actions and the ordered sequence
//! - [`trainer`]: online delta-rule prediction trainer
//! - [`simulation`]: the iteration driver
//! - [`observer`]: read-only observation adapters

#[path = "core/network.rs"]
pub mod network;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/schedule.rs"]
pub mod schedule;

#[path = "core/simulation.rs"]
pub mod simulation;

#[path = "core/trainer.rs"]
pub mod trainer;

pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use synfire::prelude::*;
/// ```
pub mod prelude {
    pub use crate::network::{
        ArrayId, GroupId, MatrixId, ModelKey, Network, Neuron, NeuronArray, NeuronGroup, NeuronId,
        Synapse, SynapseGroup, SynapseGroupId, SynapseId, WeightMatrix,
    };
    pub use crate::prng::Prng;
    pub use crate::schedule::{
        update_action, BufferedUpdate, PriorityUpdate, UpdateAction, UpdateError, UpdateModel,
        UpdateSequence,
    };
    pub use crate::simulation::Simulation;
    pub use crate::trainer::{PredictionTrainer, SynapseScope, TrainerConfig};
}
