use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use futures::StreamExt;
use huddle::{
    session::{ControllerConfig, HostPolicy, SessionConfig, SessionController, SessionEventKind},
    transport::{Participant, ParticipantId, TransportEventKind},
};
use huddle_loopback::LoopbackRoom;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(name = "huddle-repl")]
/// joins a simulated call room from the command line
struct Args {
    /// TOML file holding the controller configuration
    #[clap(long)]
    config: Option<PathBuf>,
    /// participant id whose departure ends the session
    #[clap(long)]
    host_id: Option<ParticipantId>,
    /// treat the first remote participant as host instead of a fixed id
    #[clap(long, conflicts_with = "host_id")]
    first_joiner: bool,
    /// participant id assigned to this client by the loopback transport
    #[clap(long, default_value_t = huddle_loopback::DEFAULT_LOCAL_ID)]
    local_id: ParticipantId,
    /// directory for log files. Logs go to stderr when omitted
    #[clap(long)]
    log_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> Self {
        matches!(switch, Switch::On)
    }
}

/// drive the session controller via command line
#[derive(Parser, Debug, Eq, PartialEq)]
enum Repl {
    /// join a channel
    Join {
        endpoint_id: String,
        channel_name: String,
        #[clap(long)]
        token: Option<String>,
    },
    /// leave the current session
    Hangup,
    /// flip the microphone on or off
    ToggleMic,
    /// flip the camera on or off
    ToggleCamera,
    /// turn the microphone on or off
    Mic { switch: Switch },
    /// turn the camera on or off
    Camera { switch: Switch },
    /// show the session state and local devices
    State,
    /// show the remote participants
    Participants,
    /// simulate a remote participant joining the channel
    RemoteJoin { id: ParticipantId },
    /// simulate a remote participant leaving the channel
    RemoteLeave { id: ParticipantId },
    /// deliver a participant-left event without changing the roster
    EmitLeft { id: ParticipantId },
    /// simulate the network dropping the connection
    DropConnection,
}

async fn handle_command(
    controller: &SessionController,
    room: &LoopbackRoom,
    cmd: Repl,
) -> anyhow::Result<()> {
    match cmd {
        Repl::Join {
            endpoint_id,
            channel_name,
            token,
        } => {
            let mut config = SessionConfig::new(endpoint_id, channel_name);
            if let Some(token) = token {
                config = config.with_access_token(token);
            }
            controller.request_join(config).await?;
        }
        Repl::Hangup => {
            controller.request_leave().await?;
        }
        Repl::ToggleMic => {
            let devices = controller.toggle_microphone().await?;
            println!("{devices}");
        }
        Repl::ToggleCamera => {
            let devices = controller.toggle_camera().await?;
            println!("{devices}");
        }
        Repl::Mic { switch } => {
            controller.set_microphone_enabled(switch.into()).await?;
        }
        Repl::Camera { switch } => {
            controller.set_camera_enabled(switch.into()).await?;
        }
        Repl::State => {
            let snapshot = controller.snapshot();
            println!("state: {}", snapshot.state);
            println!("devices: {}", snapshot.devices);
            if !snapshot.config.is_empty() {
                println!(
                    "channel: {} (endpoint {})",
                    snapshot.config.channel_name, snapshot.config.endpoint_id
                );
            }
            if let Some(local) = snapshot.local_participant {
                println!("you: {local}");
            }
            match snapshot.host_id {
                Some(id) => println!("host: {id}"),
                None => println!("host: unknown"),
            }
        }
        Repl::Participants => {
            let participants = controller.remote_participants();
            if participants.is_empty() {
                println!("no remote participants");
            }
            for participant in participants {
                println!("{participant}");
            }
        }
        Repl::RemoteJoin { id } => {
            if !room.add_remote(id) {
                anyhow::bail!("participant {id} is already in the room");
            }
        }
        Repl::RemoteLeave { id } => {
            if !room.remove_remote(id) {
                anyhow::bail!("participant {id} is not in the room");
            }
        }
        Repl::EmitLeft { id } => {
            room.emit(TransportEventKind::ParticipantLeft {
                participant: Participant::remote(id),
            });
        }
        Repl::DropConnection => {
            room.drop_connection("connection dropped from repl");
        }
    }
    Ok(())
}

async fn handle_session_events(controller: SessionController) {
    let mut stream = controller.subscribe();
    drop(controller);
    while let Some(evt) = stream.next().await {
        match evt {
            SessionEventKind::HostEndedSession { .. } => println!("*** {evt} ***"),
            _ => println!("SessionEvent: {evt}"),
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<ControllerConfig> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => ControllerConfig::default(),
    };
    if let Some(id) = args.host_id {
        config = config.with_host_id(id);
    }
    if args.first_joiner {
        config.host = HostPolicy::FirstJoiner;
    }
    Ok(config)
}

fn read_config(path: &Path) -> anyhow::Result<ControllerConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    let config = toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _guard = match &args.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::hourly(dir, "huddle-repl.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_writer(non_blocking)
                .with_env_filter(EnvFilter::from_default_env())
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(EnvFilter::from_default_env())
                .init();
            None
        }
    };

    let config = load_config(&args)?;
    tracing::debug!(?config, "loaded controller configuration");

    let room = LoopbackRoom::new(args.local_id);
    let transport = room.transport();
    println!("using {}", huddle::Extension::description(&transport));

    let controller = SessionController::new(Box::new(transport), config).await?;
    let event_handle = tokio::spawn(handle_session_events(controller.clone()));

    println!("starting REPL");
    println!("enter --help to see available commands");

    let mut iter = std::io::stdin().lines();
    while let Some(Ok(line)) = iter.next() {
        let mut v = vec![""];
        v.extend(line.split_ascii_whitespace());
        let cli = match Repl::try_parse_from(v) {
            Ok(r) => r,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if let Err(e) = handle_command(&controller, &room, cli).await {
            println!("command failed: {e}");
        }
    }

    controller.shutdown().await?;
    event_handle.abort();

    Ok(())
}
