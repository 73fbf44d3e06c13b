//! Synfire daemon - background simulation service
//!
//! Runs the prediction network inside a headless smell world, ticking at a
//! configurable rate, and serves a line-delimited JSON protocol on TCP for
//! CLI and UI clients.
//!
//! Each tick couples world and network: the agent's smell sensors feed the
//! sensory group, one network iteration runs (including the prediction
//! trainer), and the action group's drive moves the agent.
//!
//! Config location:
//! - Linux: ~/.local/share/synfire/config.json
//! - macOS: ~/Library/Application Support/synfire/config.json
//! - Windows: %APPDATA%\synfire\config.json

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use synfire::observer::{NetworkSnapshot, SimulationAdapter};
use synfire::prelude::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, RwLock};
use tokio::time;
use tracing::{debug, error, info, warn};

mod config;
mod paths;
mod world;

use config::DaemonConfig;
use paths::AppPaths;
use world::{OdorWorld, WanderPilot, SMELL_CHANNELS};

/// Iterations run per lock acquisition while a queued batch is draining.
/// Keeps clients responsive during long `iterate` requests.
const BATCH_CHUNK: u64 = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    GetState,
    Start,
    Stop,
    Iterate { n: u64 },
    IterateAwait { n: u64 },
    Probe { group: String },
    Act { action: String },
    SetMode { mode: String },
    SetFramerate { fps: u32 },
    Snapshot,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    State(Box<StateSnapshot>),
    Activations {
        group: String,
        activations: Vec<f64>,
    },
    Snapshot(Box<NetworkSnapshot>),
    Success {
        message: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateSnapshot {
    running: bool,
    mode: String,
    target_fps: u32,
    iterations: u64,
    pending: u64,
    agent: AgentSummary,
    smells: Vec<f64>,
    prediction_error: f64,
    groups: Vec<GroupInfo>,
    actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgentSummary {
    x: f64,
    y: f64,
    heading: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GroupInfo {
    label: String,
    size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PilotMode {
    Auto,
    Manual,
}

impl PilotMode {
    fn as_str(self) -> &'static str {
        match self {
            PilotMode::Auto => "auto",
            PilotMode::Manual => "manual",
        }
    }
}

/// A queued iteration batch. At most one exists at a time; `done` is present
/// only for awaited batches.
struct PendingIterate {
    remaining: u64,
    done: Option<oneshot::Sender<Result<u64, String>>>,
}

struct DaemonState {
    sim: Simulation,
    world: OdorWorld,
    pilot: WanderPilot,
    sensory: GroupId,
    actions: GroupId,
    error_neuron: NeuronId,
    running: bool,
    mode: PilotMode,
    target_fps: u32,
    manual_drive: (f64, f64, f64),
    last_smells: Vec<f64>,
    pending: Option<PendingIterate>,
}

impl DaemonState {
    /// Builds the agent network: a sensory group fed by the world, a clamped
    /// action group driving the agent, a prediction group fully connected
    /// from both, and a loose error neuron written by the trainer.
    fn new(config: &DaemonConfig) -> Result<Self, UpdateError> {
        let mut sim = Simulation::new();
        let net = sim.network_mut();

        let sensory = net.add_neuron_group(SMELL_CHANNELS);
        net.group_mut(sensory).label = "Sensory".to_string();
        for (i, label) in ["Cheese", "Flower", "Fish"].iter().enumerate() {
            let id = net.group_neurons(sensory)[i];
            net.neuron_mut(id).label = (*label).to_string();
        }

        let actions = net.add_neuron_group(3);
        net.group_mut(actions).label = "Actions".to_string();
        for (i, label) in ["Straight", "Right", "Left"].iter().enumerate() {
            let id = net.group_neurons(actions)[i];
            net.neuron_mut(id).label = (*label).to_string();
        }
        net.set_group_clamped(actions, true);

        let prediction = net.add_neuron_group(SMELL_CHANNELS);
        net.group_mut(prediction).label = "Predicted".to_string();

        net.connect_all_to_all(sensory, prediction, 0.0);
        net.connect_all_to_all(actions, prediction, 0.0);

        let error_neuron = net.add_neuron();
        net.neuron_mut(error_neuron).label = "Error".to_string();
        net.set_clamped(error_neuron, true);

        let trainer =
            PredictionTrainer::new(net, sensory, prediction, error_neuron, TrainerConfig::default())?;
        sim.actions_mut().add(trainer);

        Ok(Self {
            sim,
            world: OdorWorld::new(&config.world),
            pilot: WanderPilot::new(config.seed),
            sensory,
            actions,
            error_neuron,
            running: false,
            mode: PilotMode::Auto,
            target_fps: config.target_fps,
            manual_drive: (0.0, 0.0, 0.0),
            last_smells: vec![0.0; SMELL_CHANNELS],
            pending: None,
        })
    }

    /// One coupled step: sense, set the motor command, run an iteration,
    /// move the agent.
    fn tick(&mut self) -> Result<(), UpdateError> {
        let drive = match self.mode {
            PilotMode::Auto => self.pilot.next_drive(),
            PilotMode::Manual => self.manual_drive,
        };
        let smells = self.world.sensor_frame();
        {
            let net = self.sim.network_mut();
            net.add_group_inputs(self.sensory, &smells);
            net.set_group_activations(self.actions, &[drive.0, drive.1, drive.2]);
        }
        self.last_smells = smells;

        self.sim.update()?;

        self.world.apply_drive(drive.0, drive.1, drive.2);
        Ok(())
    }

    /// Runs up to one chunk of the queued batch, completing it (and waking
    /// the waiter, if any) when the count reaches zero. A failed tick aborts
    /// the batch and reports the error to the waiter.
    fn drive_pending(&mut self) {
        let Some(remaining) = self.pending.as_ref().map(|p| p.remaining) else {
            return;
        };
        let burst = remaining.min(BATCH_CHUNK);
        for _ in 0..burst {
            if let Err(e) = self.tick() {
                error!("Batch iteration failed: {e}");
                if let Some(p) = self.pending.take() {
                    if let Some(done) = p.done {
                        let _ = done.send(Err(e.to_string()));
                    }
                }
                return;
            }
        }
        if let Some(p) = self.pending.as_mut() {
            p.remaining -= burst;
        }
        if self.pending.as_ref().is_some_and(|p| p.remaining == 0) {
            if let Some(p) = self.pending.take() {
                debug!("Batch complete at iteration {}", self.sim.iterations());
                if let Some(done) = p.done {
                    let _ = done.send(Ok(self.sim.iterations()));
                }
            }
        }
    }

    fn state_snapshot(&self) -> StateSnapshot {
        let agent = self.world.agent();
        let net = self.sim.network();
        StateSnapshot {
            running: self.running,
            mode: self.mode.as_str().to_string(),
            target_fps: self.target_fps,
            iterations: self.sim.iterations(),
            pending: self.pending.as_ref().map(|p| p.remaining).unwrap_or(0),
            agent: AgentSummary {
                x: agent.x,
                y: agent.y,
                heading: agent.heading,
            },
            smells: self.last_smells.clone(),
            prediction_error: net.neuron(self.error_neuron).activation,
            groups: net
                .group_ids()
                .map(|g| GroupInfo {
                    label: net.group(g).label.clone(),
                    size: net.group(g).len(),
                })
                .collect(),
            actions: self
                .sim
                .actions()
                .names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    state: Arc<RwLock<DaemonState>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let request: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let resp = Response::Error {
                    message: format!("Invalid request: {}", e),
                };
                writer.write_all(serde_json::to_string(&resp)?.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                continue;
            }
        };

        let response = match request {
            Request::GetState => {
                let s = state.read().await;
                Response::State(Box::new(s.state_snapshot()))
            }
            Request::Start => {
                let mut s = state.write().await;
                s.running = true;
                info!("Tick loop started");
                Response::Success {
                    message: "Started".to_string(),
                }
            }
            Request::Stop => {
                let mut s = state.write().await;
                s.running = false;
                info!("Tick loop stopped");
                Response::Success {
                    message: "Stopped".to_string(),
                }
            }
            Request::Iterate { n } => {
                let mut s = state.write().await;
                if s.pending.is_some() {
                    Response::Error {
                        message: "a batch is already in flight".to_string(),
                    }
                } else if n == 0 {
                    Response::Success {
                        message: "Nothing to do".to_string(),
                    }
                } else {
                    s.pending = Some(PendingIterate {
                        remaining: n,
                        done: None,
                    });
                    Response::Success {
                        message: format!("Queued {} iterations", n),
                    }
                }
            }
            Request::IterateAwait { n } => {
                // Register the waiter under the lock, then block only this
                // connection until the batch drains.
                let rx = {
                    let mut s = state.write().await;
                    if s.pending.is_some() {
                        None
                    } else {
                        let (tx, rx) = oneshot::channel();
                        s.pending = Some(PendingIterate {
                            remaining: n,
                            done: Some(tx),
                        });
                        Some(rx)
                    }
                };
                match rx {
                    None => Response::Error {
                        message: "a batch is already in flight".to_string(),
                    },
                    Some(rx) => match rx.await {
                        Ok(Ok(total)) => Response::Success {
                            message: format!("Completed; {} iterations total", total),
                        },
                        Ok(Err(e)) => Response::Error { message: e },
                        Err(_) => Response::Error {
                            message: "batch abandoned".to_string(),
                        },
                    },
                }
            }
            Request::Probe { group } => {
                let s = state.read().await;
                match SimulationAdapter::new(&s.sim).probe(&group) {
                    Some(activations) => Response::Activations { group, activations },
                    None => Response::Error {
                        message: format!("no group labeled `{}`", group),
                    },
                }
            }
            Request::Act { action } => {
                let drive = match action.as_str() {
                    "straight" => Some((1.0, 0.0, 0.0)),
                    "right" => Some((1.0, 1.0, 0.0)),
                    "left" => Some((1.0, 0.0, 1.0)),
                    "none" => Some((0.0, 0.0, 0.0)),
                    _ => None,
                };
                match drive {
                    None => Response::Error {
                        message: format!("unknown action `{}`", action),
                    },
                    Some(d) => {
                        let mut s = state.write().await;
                        if s.mode != PilotMode::Manual {
                            Response::Error {
                                message: "switch to manual mode first".to_string(),
                            }
                        } else {
                            s.manual_drive = d;
                            Response::Success {
                                message: format!("Driving {}", action),
                            }
                        }
                    }
                }
            }
            Request::SetMode { mode } => match mode.as_str() {
                "auto" => {
                    let mut s = state.write().await;
                    s.mode = PilotMode::Auto;
                    info!("Pilot mode set to auto");
                    Response::Success {
                        message: "Auto pilot".to_string(),
                    }
                }
                "manual" => {
                    let mut s = state.write().await;
                    s.mode = PilotMode::Manual;
                    s.manual_drive = (0.0, 0.0, 0.0);
                    info!("Pilot mode set to manual");
                    Response::Success {
                        message: "Manual pilot".to_string(),
                    }
                }
                _ => Response::Error {
                    message: format!("Invalid mode: {} (expected auto|manual)", mode),
                },
            },
            Request::SetFramerate { fps } => {
                let mut s = state.write().await;
                let clamped = fps.clamp(1, 1000);
                s.target_fps = clamped;
                info!("Framerate set to {} FPS", clamped);
                Response::Success {
                    message: format!("Framerate set to {} FPS", clamped),
                }
            }
            Request::Snapshot => {
                let s = state.read().await;
                Response::Snapshot(Box::new(SimulationAdapter::new(&s.sim).snapshot()))
            }
            Request::Shutdown => {
                info!("Shutdown requested");
                // Exit after the response has a chance to flush.
                tokio::spawn(async {
                    time::sleep(Duration::from_millis(50)).await;
                    std::process::exit(0);
                });
                Response::Success {
                    message: "Shutting down".to_string(),
                }
            }
        };

        writer.write_all(serde_json::to_string(&response)?.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let paths = AppPaths::new()?;
    let config = match DaemonConfig::load_or_default(&paths.config_file()) {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not load config: {}", e);
            info!("Starting with defaults");
            DaemonConfig::default()
        }
    };
    info!("Data dir: {}", paths.data_dir().display());

    let state = Arc::new(RwLock::new(DaemonState::new(&config)?));

    // Stop cleanly on Ctrl-C; nothing needs persisting.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C: shutting down");
            std::process::exit(0);
        }
    });

    let listener = TcpListener::bind(&config.addr).await?;
    info!("synfired listening on {}", config.addr);

    // Tick loop: drain queued batches at full speed, otherwise pace the
    // free-running loop at the target framerate.
    let state_clone = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            let (has_pending, target_fps) = {
                let s = state_clone.read().await;
                (s.pending.is_some(), s.target_fps)
            };

            if has_pending {
                {
                    let mut s = state_clone.write().await;
                    s.drive_pending();
                }
                tokio::task::yield_now().await;
                continue;
            }

            let frame_millis = (1000 / target_fps.max(1)).max(1) as u64;
            time::sleep(Duration::from_millis(frame_millis)).await;

            let mut s = state_clone.write().await;
            if s.running {
                if let Err(e) = s.tick() {
                    error!("Tick failed: {e}");
                    s.running = false;
                }
            }
        }
    });

    // Accept client connections
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("Client connected: {}", addr);
        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, state_clone).await {
                error!("Client handler error: {}", e);
            }
        });
    }
}
