//! CLI client for the `synfired` daemon.
//!
//! Examples:
//!   synfire-cli status
//!   synfire-cli start
//!   synfire-cli iterate 500
//!   synfire-cli iterate 500 --wait
//!   synfire-cli probe Predicted
//!   synfire-cli act left
//!   synfire-cli mode manual
//!
//! By default it talks to 127.0.0.1:9877; override with `--addr host:port`.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Awaited batches can run for a while; give them room.
const WAIT_TIMEOUT: Duration = Duration::from_secs(600);

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
    Snapshot(Box<NetworkDump>),
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
    #[serde(default)]
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

/// Mirror of the observer snapshot the daemon sends for `snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NetworkDump {
    iterations: u64,
    revision: u64,
    neurons: usize,
    synapses: usize,
    synapse_groups: usize,
    arrays: usize,
    matrices: usize,
    groups: Vec<GroupDump>,
    labeled_neurons: Vec<(String, f64)>,
    actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GroupDump {
    label: String,
    activations: Vec<f64>,
}

fn usage() -> ! {
    eprintln!("synfire-cli (talks to synfired @ 127.0.0.1:9877 by default)");
    eprintln!("Usage: synfire-cli [--addr host:port] <command> [args]\n");
    eprintln!("Commands:");
    eprintln!("  status                      Show daemon state");
    eprintln!("  start | stop                Control the tick loop");
    eprintln!("  iterate <n> [--wait]        Run n iterations; --wait blocks until done");
    eprintln!("  probe <group>               Print a group's activations");
    eprintln!("  act <straight|right|left|none>  Drive the agent (manual mode)");
    eprintln!("  mode <auto|manual>          Switch pilot mode");
    eprintln!("  fps <1-1000>                Set tick rate");
    eprintln!("  snapshot                    Dump the full network snapshot as JSON");
    eprintln!("  shutdown                    Stop the daemon");
    process::exit(1);
}

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    let mut addr = "127.0.0.1:9877".to_string();
    if args.len() >= 2 && args[0] == "--addr" {
        addr = args[1].clone();
        args.drain(0..2);
    }

    if args.is_empty() {
        usage();
    }

    (addr, args)
}

fn send_request(addr: &str, req: &Request, read_timeout: Duration) -> Result<Response, String> {
    let mut stream = TcpStream::connect(addr).map_err(|e| format!("connect: {e}"))?;
    stream
        .set_read_timeout(Some(read_timeout))
        .map_err(|e| format!("set_read_timeout: {e}"))?;
    let mut reader = BufReader::new(stream.try_clone().map_err(|e| format!("clone: {e}"))?);

    let line = serde_json::to_string(req).map_err(|e| format!("serialize: {e}"))?;
    stream
        .write_all(line.as_bytes())
        .and_then(|_| stream.write_all(b"\n"))
        .map_err(|e| format!("send: {e}"))?;

    let mut resp_line = String::new();
    reader
        .read_line(&mut resp_line)
        .map_err(|e| format!("recv: {e}"))?;
    serde_json::from_str(&resp_line).map_err(|e| format!("parse response: {e}"))
}

fn fmt_activations(values: &[f64]) -> String {
    let cells: Vec<String> = values.iter().map(|v| format!("{v:+.3}")).collect();
    format!("[{}]", cells.join(" "))
}

fn print_state(s: StateSnapshot) {
    println!(
        "mode={:<6} running={} fps={} iterations={} pending={}",
        s.mode, s.running, s.target_fps, s.iterations, s.pending,
    );
    println!(
        "agent: x={:.1} y={:.1} heading={:.1}",
        s.agent.x, s.agent.y, s.agent.heading,
    );
    println!(
        "smells={} prediction_error={:.4}",
        fmt_activations(&s.smells),
        s.prediction_error,
    );
    let groups: Vec<String> = s
        .groups
        .iter()
        .map(|g| format!("{}({})", g.label, g.size))
        .collect();
    println!("groups: {}", groups.join(" "));
    println!("sequence: {}", s.actions.join(" -> "));
}

fn main() {
    let (addr, args) = parse_args();
    let cmd = &args[0];

    let make_error = |msg: &str| -> ! {
        eprintln!("{}", msg);
        process::exit(1);
    };

    let mut read_timeout = DEFAULT_TIMEOUT;
    let req = match cmd.as_str() {
        "status" => Request::GetState,
        "start" => Request::Start,
        "stop" => Request::Stop,
        "iterate" => {
            if args.len() < 2 {
                usage();
            }
            let n: u64 = args[1]
                .parse()
                .unwrap_or_else(|_| make_error("iterate count must be a number"));
            if args.iter().any(|a| a == "--wait") {
                read_timeout = WAIT_TIMEOUT;
                Request::IterateAwait { n }
            } else {
                Request::Iterate { n }
            }
        }
        "probe" => {
            if args.len() < 2 {
                usage();
            }
            Request::Probe {
                group: args[1].clone(),
            }
        }
        "act" => {
            if args.len() < 2 {
                usage();
            }
            let action = args[1].clone();
            if !["straight", "right", "left", "none"].contains(&action.as_str()) {
                make_error("action must be straight|right|left|none");
            }
            Request::Act { action }
        }
        "mode" => {
            if args.len() < 2 {
                usage();
            }
            let mode = args[1].clone();
            if mode != "auto" && mode != "manual" {
                make_error("mode must be 'auto' or 'manual'");
            }
            Request::SetMode { mode }
        }
        "fps" => {
            if args.len() < 2 {
                usage();
            }
            let fps: u32 = args[1]
                .parse()
                .unwrap_or_else(|_| make_error("fps must be a number (1-1000)"));
            Request::SetFramerate { fps }
        }
        "snapshot" => Request::Snapshot,
        "shutdown" => Request::Shutdown,
        _ => usage(),
    };

    match send_request(&addr, &req, read_timeout) {
        Ok(Response::State(s)) => print_state(*s),
        Ok(Response::Activations { group, activations }) => {
            println!("{group}: {}", fmt_activations(&activations));
        }
        Ok(Response::Snapshot(dump)) => match serde_json::to_string_pretty(&dump) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to render snapshot: {e}");
                process::exit(1);
            }
        },
        Ok(Response::Success { message }) => println!("{message}"),
        Ok(Response::Error { message }) => {
            eprintln!("Error: {message}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed: {e}");
            process::exit(1);
        }
    }
}
