//! The update action framework: named, invocable units of network work,
//! held in an ordered sequence that defines exactly what one simulation
//! iteration does.
//!
//! Built-in actions cover the three update disciplines (buffered two-phase,
//! priority-ordered, per-model); arbitrary custom actions slot in through
//! [`UpdateAction`] or the [`update_action`] closure adapter.

use crate::network::{ModelKey, Network};

/// Error type for update scheduling and training.
#[derive(Debug)]
pub enum UpdateError {
    /// Sensory and prediction populations must be the same size.
    PopulationSizeMismatch { sensory: usize, prediction: usize },
    /// An operation addressed a model the network does not contain.
    MissingModel { kind: &'static str, id: usize },
    /// A configuration value failed validation.
    InvalidConfig { reason: &'static str },
    /// An action in the sequence failed, aborting the iteration.
    ActionFailed {
        name: String,
        source: Box<UpdateError>,
    },
}

impl std::fmt::Display for UpdateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateError::PopulationSizeMismatch {
                sensory,
                prediction,
            } => {
                write!(
                    f,
                    "population size mismatch: sensory has {} neurons, prediction has {}",
                    sensory, prediction
                )
            }
            UpdateError::MissingModel { kind, id } => {
                write!(f, "no {} with id {} in this network", kind, id)
            }
            UpdateError::InvalidConfig { reason } => {
                write!(f, "invalid configuration: {}", reason)
            }
            UpdateError::ActionFailed { name, source } => {
                write!(f, "update action `{}` failed: {}", name, source)
            }
        }
    }
}

impl std::error::Error for UpdateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpdateError::ActionFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// One named unit of work in the update sequence.
///
/// Actions are invoked in sequence order, once per iteration, with exclusive
/// access to the network. State that must survive between iterations lives in
/// the action itself (see the prediction trainer); everything else should be
/// derived fresh from the network on each call.
pub trait UpdateAction: Send + Sync {
    /// Stable, human-readable name. Shown in sequence listings and carried
    /// in [`UpdateError::ActionFailed`].
    fn name(&self) -> &str;

    /// Longer description for listings. Defaults to the name.
    fn description(&self) -> &str {
        self.name()
    }

    /// Perform this action's work for the current iteration.
    fn invoke(&mut self, network: &mut Network) -> Result<(), UpdateError>;
}

/// Closure-backed action, built with [`update_action`].
pub struct FnAction<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a named update action.
pub fn update_action<F>(name: impl Into<String>, f: F) -> FnAction<F>
where
    F: FnMut(&mut Network) -> Result<(), UpdateError> + Send + Sync,
{
    FnAction {
        name: name.into(),
        f,
    }
}

impl<F> UpdateAction for FnAction<F>
where
    F: FnMut(&mut Network) -> Result<(), UpdateError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&mut self, network: &mut Network) -> Result<(), UpdateError> {
        (self.f)(network)
    }
}

/// The buffered two-phase discipline: stage every model from previous-step
/// state, then commit all buffers at once.
#[derive(Debug, Default, Clone, Copy)]
pub struct BufferedUpdate;

impl UpdateAction for BufferedUpdate {
    fn name(&self) -> &str {
        "Buffered update"
    }

    fn description(&self) -> &str {
        "Two-phase update of every model: stage from previous-step state, then commit"
    }

    fn invoke(&mut self, network: &mut Network) -> Result<(), UpdateError> {
        network.buffered_update();
        Ok(())
    }
}

/// The priority-ordered discipline: loose neurons in ascending priority with
/// immediate commits, then everything that is not a loose neuron.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityUpdate;

impl UpdateAction for PriorityUpdate {
    fn name(&self) -> &str {
        "Priority update"
    }

    fn description(&self) -> &str {
        "Loose neurons in ascending priority (immediate commit), then grouped models"
    }

    fn invoke(&mut self, network: &mut Network) -> Result<(), UpdateError> {
        network.update_neurons_by_priority();
        network.update_all_but_neurons();
        Ok(())
    }
}

/// Update one addressed model and nothing else.
pub struct UpdateModel {
    key: ModelKey,
    name: String,
}

impl UpdateModel {
    pub fn new(key: ModelKey) -> Self {
        let name = format!("Update {} {}", key.kind(), key.id());
        Self { key, name }
    }

    pub fn key(&self) -> ModelKey {
        self.key
    }
}

impl UpdateAction for UpdateModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Update a single model, leaving the rest of the network untouched"
    }

    fn invoke(&mut self, network: &mut Network) -> Result<(), UpdateError> {
        network.update_model(self.key)
    }
}

/// Ordered registry of update actions. Order is execution order.
#[derive(Default)]
pub struct UpdateSequence {
    actions: Vec<Box<dyn UpdateAction>>,
}

impl UpdateSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action to the end of the sequence.
    pub fn add(&mut self, action: impl UpdateAction + 'static) {
        self.actions.push(Box::new(action));
    }

    pub fn add_boxed(&mut self, action: Box<dyn UpdateAction>) {
        self.actions.push(action);
    }

    /// Insert before the action currently at `index`.
    pub fn insert(&mut self, index: usize, action: impl UpdateAction + 'static) {
        self.actions.insert(index, Box::new(action));
    }

    /// Remove and return the action at `index`.
    pub fn remove(&mut self, index: usize) -> Box<dyn UpdateAction> {
        self.actions.remove(index)
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Action names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    /// Run every action once, in order. The first failure aborts the
    /// iteration: remaining actions do not run, and the error names the
    /// action that failed.
    pub fn invoke_all(&mut self, network: &mut Network) -> Result<(), UpdateError> {
        for action in &mut self.actions {
            if let Err(e) = action.invoke(network) {
                return Err(UpdateError::ActionFailed {
                    name: action.name().to_string(),
                    source: Box::new(e),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for UpdateSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateSequence")
            .field("actions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Action that appends one decimal digit to neuron 0's aux value, so a
    /// pass over the sequence leaves a record of execution order.
    fn digit_action(d: u32) -> impl UpdateAction {
        update_action(format!("digit {}", d), move |net: &mut Network| {
            let aux = &mut net.neuron_mut(0).aux_value;
            *aux = *aux * 10.0 + f64::from(d);
            Ok(())
        })
    }

    fn one_neuron_network() -> Network {
        let mut net = Network::new();
        net.add_neuron();
        net
    }

    #[test]
    fn actions_run_in_registration_order() {
        let mut net = one_neuron_network();
        let mut seq = UpdateSequence::new();
        seq.add(digit_action(1));
        seq.add(digit_action(2));
        seq.add(digit_action(3));
        seq.invoke_all(&mut net).unwrap();
        assert_eq!(net.neuron(0).aux_value, 123.0);
    }

    #[test]
    fn insert_interleaves_before_existing_actions() {
        let mut net = one_neuron_network();
        let mut seq = UpdateSequence::new();
        seq.add(digit_action(1));
        seq.add(digit_action(3));
        seq.insert(1, digit_action(2));
        assert_eq!(seq.names(), vec!["digit 1", "digit 2", "digit 3"]);
        seq.invoke_all(&mut net).unwrap();
        assert_eq!(net.neuron(0).aux_value, 123.0);
    }

    #[test]
    fn first_failure_stops_the_iteration_and_names_the_action() {
        let mut net = one_neuron_network();
        let mut seq = UpdateSequence::new();
        seq.add(digit_action(1));
        seq.add(update_action("Broken", |_: &mut Network| {
            Err(UpdateError::InvalidConfig {
                reason: "broken on purpose",
            })
        }));
        seq.add(digit_action(9));
        let err = seq.invoke_all(&mut net).unwrap_err();
        match err {
            UpdateError::ActionFailed { name, .. } => assert_eq!(name, "Broken"),
            other => panic!("unexpected error: {other}"),
        }
        // The action after the failure never ran.
        assert_eq!(net.neuron(0).aux_value, 1.0);
    }

    #[test]
    fn removed_action_no_longer_runs() {
        let mut net = one_neuron_network();
        let mut seq = UpdateSequence::new();
        seq.add(digit_action(1));
        seq.add(digit_action(2));
        let removed = seq.remove(0);
        assert_eq!(removed.name(), "digit 1");
        seq.invoke_all(&mut net).unwrap();
        assert_eq!(net.neuron(0).aux_value, 2.0);
    }

    #[test]
    fn per_model_action_failure_carries_the_address() {
        let mut net = one_neuron_network();
        let mut seq = UpdateSequence::new();
        seq.add(UpdateModel::new(ModelKey::Group(3)));
        let err = seq.invoke_all(&mut net).unwrap_err();
        assert_eq!(
            err.to_string(),
            "update action `Update neuron group 3` failed: no neuron group with id 3 in this network"
        );
    }

    #[test]
    fn built_in_disciplines_share_the_registry() {
        let mut net = Network::new();
        let a = net.add_neuron();
        let b = net.add_neuron();
        net.add_synapse(a, b, 0.5);
        net.neuron_mut(a).clamped = true;
        net.neuron_mut(a).activation = 1.0;

        let mut seq = UpdateSequence::new();
        seq.add(BufferedUpdate);
        seq.add(PriorityUpdate);
        seq.add(update_action("noop", |_: &mut Network| Ok(())));
        assert_eq!(seq.names(), vec!["Buffered update", "Priority update", "noop"]);
        seq.invoke_all(&mut net).unwrap();
        assert_eq!(net.neuron(b).activation, 0.5);
    }
}
