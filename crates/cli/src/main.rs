use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tsinspect::source::AxonOptions;
use tsinspect::{Action, Connection, ConnectionConfig, SourceOptions, Target, TracingSink};

#[derive(Parser)]
#[command(
    name = "tsinspect",
    about = "Show the protocol dialog and timestamp drift of a live RTSP or HTTP/FLV stream"
)]
struct Args {
    /// Stream URL: proto://[user:pass@]host:port/content
    url: String,

    /// Control port of DVR (HTTP/FLV) sources
    #[arg(long, default_value_t = 2232)]
    control_port: u16,

    /// Seconds between play position queries, 0 to disable
    #[arg(long, default_value_t = 0)]
    pos_period: u64,

    /// Initial playback speed of Axon sources
    #[arg(long, default_value_t = 1)]
    speed: i32,

    /// Port of the Axon archive depth service
    #[arg(long, default_value_t = 80)]
    range_port: u16,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let target = match Target::parse(&args.url) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let options = SourceOptions {
        control_port: args.control_port,
        axon: AxonOptions {
            speed: args.speed,
            range_port: args.range_port,
            ..AxonOptions::default()
        },
    };
    let sink = Arc::new(TracingSink);
    let source = match target.open_source(sink.clone(), &options) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to open source: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = ConnectionConfig {
        position_period: (args.pos_period > 0).then(|| Duration::from_secs(args.pos_period)),
        ..ConnectionConfig::default()
    };
    let mut connection = Connection::start(&target.host, target.port, source, sink, config);

    println!(
        "Inspecting {}:{} as {:?}; enter commands (scale 2, seek <start>, pause, ...) or quit",
        target.host,
        target.port,
        target.variant()
    );

    let (lines, commands) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if lines.send(line).is_err() {
                break;
            }
        }
    });

    while connection.is_running() {
        match commands.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "quit" {
                    break;
                }
                match Action::parse(line) {
                    Ok(action) => connection.request_action(action),
                    Err(e) => eprintln!("{}", e),
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    connection.stop();
    match connection.take_error() {
        Some(e) => {
            eprintln!("Session stopped: {}", e);
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}
