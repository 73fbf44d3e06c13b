use synfire::observer::SimulationAdapter;
use synfire::prelude::*;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h" || args[1] == "help") {
        print_help();
        return;
    }
    if args.len() >= 2 && args[1] == "priority-demo" {
        run_priority_demo();
        return;
    }

    if args.len() >= 2 {
        eprintln!("Unknown command: {}", args[1]);
        print_help();
        std::process::exit(2);
    }

    // Minimal demo:
    // - three one-hot "smell" patterns rotate through a clamped sensory group
    // - a prediction group learns, online, to forecast the sensory frame
    // - a loose "Error" neuron reports root-sum-square prediction error
    // Error spikes at every pattern switch, then decays as the trainer
    // re-learns the new frame.

    let mut sim = Simulation::new();
    let net = sim.network_mut();
    let sensory = net.add_neuron_group(3);
    let actions = net.add_neuron_group(3);
    let prediction = net.add_neuron_group(3);
    net.group_mut(sensory).label = "Sensory".into();
    net.group_mut(actions).label = "Actions".into();
    net.group_mut(prediction).label = "Predicted".into();
    for (i, name) in ["Cheese", "Flower", "Fish"].iter().enumerate() {
        let id = net.group_neurons(sensory)[i];
        net.neuron_mut(id).label = (*name).into();
    }
    for (i, name) in ["Straight", "Right", "Left"].iter().enumerate() {
        let id = net.group_neurons(actions)[i];
        net.neuron_mut(id).label = (*name).into();
    }
    net.connect_all_to_all(sensory, prediction, 0.0);
    net.connect_all_to_all(actions, prediction, 0.0);
    let error = net.add_neuron();
    net.neuron_mut(error).label = "Error".into();
    net.set_clamped(error, true);
    net.set_group_clamped(sensory, true);
    net.set_group_clamped(actions, true);

    let trainer =
        match PredictionTrainer::new(net, sensory, prediction, error, TrainerConfig::default()) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("failed to build trainer: {e}");
                std::process::exit(1);
            }
        };
    sim.actions_mut().add(trainer);

    for t in 0..600u64 {
        let (smell, pattern) = match (t / 100) % 3 {
            0 => ("Cheese", [1.0, 0.0, 0.0]),
            1 => ("Flower", [0.0, 1.0, 0.0]),
            _ => ("Fish", [0.0, 0.0, 1.0]),
        };
        sim.network_mut().set_group_activations(sensory, &pattern);

        if let Err(e) = sim.update() {
            eprintln!("iteration failed: {e}");
            std::process::exit(1);
        }

        if t % 25 == 0 {
            let err = sim.network().neuron(error).activation;
            let predicted = sim.network().group_activations(prediction);
            println!(
                "t={t:4} smell={smell:<7} error={err:.4}  predicted=[{:+.3} {:+.3} {:+.3}]",
                predicted[0], predicted[1], predicted[2]
            );
        }
    }
    println!("done: {} iterations", sim.iterations());
    match serde_json::to_string_pretty(&SimulationAdapter::new(&sim).snapshot()) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("snapshot serialization failed: {e}"),
    }
}

fn print_help() {
    println!("synfire (network update scheduling demo)");
    println!("usage:");
    println!("  cargo run");
    println!("  cargo run -- priority-demo");
    println!("  cargo run -- --help");
}

/// Identical relay under a chosen discipline: a -> b -> c, source clamped.
fn relay(discipline: impl UpdateAction + 'static) -> (Simulation, NeuronId, NeuronId) {
    let mut sim = Simulation::new();
    sim.actions_mut().clear();
    sim.actions_mut().add(discipline);
    let net = sim.network_mut();
    let a = net.add_neuron();
    let b = net.add_neuron();
    let c = net.add_neuron();
    net.neuron_mut(b).priority = 1;
    net.neuron_mut(c).priority = 2;
    net.add_synapse(a, b, 1.0);
    net.add_synapse(b, c, 1.0);
    net.set_clamped(a, true);
    net.force_set_activation(a, 1.0);
    (sim, b, c)
}

fn run_priority_demo() {
    // Priority order commits each neuron before its followers read it, so
    // the clamped source value crosses the whole chain in one iteration.
    // The buffered discipline moves it one hop per iteration.
    let (mut priority, pb, pc) = relay(PriorityUpdate);
    let (mut buffered, bb, bc) = relay(BufferedUpdate);

    println!("three-neuron relay a -> b -> c, source clamped at 1.0");
    for round in 1..=3 {
        for sim in [&mut priority, &mut buffered] {
            if let Err(e) = sim.update() {
                eprintln!("iteration failed: {e}");
                std::process::exit(1);
            }
        }
        let p = priority.network();
        let f = buffered.network();
        println!(
            "iteration {round}: priority b={:.1} c={:.1} | buffered b={:.1} c={:.1}",
            p.neuron(pb).activation,
            p.neuron(pc).activation,
            f.neuron(bb).activation,
            f.neuron(bc).activation,
        );
    }
}
