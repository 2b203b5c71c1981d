use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pomosync_ipc::{
    read_message, write_message, Category, Command, IpcError, PhaseStatus, Response, TimerStatus,
    TimerType, SOCKET_PATH,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "pomosyncctl")]
#[command(about = "Control the pomosync timer", long_about = None)]
struct Cli {
    /// Control socket of the running pomosync
    #[arg(long, default_value = SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the current phase
    Start,
    /// Pause the running phase
    Stop,
    /// Resume a paused phase
    Resume,
    /// Reset the current phase to its full length
    Reset,
    /// Show timer status
    Status {
        /// Print the raw status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the task for the next work session
    Task {
        description: String,
        #[arg(short, long, value_enum)]
        category: Option<CategoryArg>,
    },
    /// Set a phase length, as minutes or MM:SS
    Duration {
        #[arg(value_enum)]
        phase: PhaseArg,
        length: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CategoryArg {
    Work,
    Study,
    Personal,
    Other,
}

impl From<CategoryArg> for Category {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Work => Category::Work,
            CategoryArg::Study => Category::Study,
            CategoryArg::Personal => Category::Personal,
            CategoryArg::Other => Category::Other,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PhaseArg {
    Work,
    ShortBreak,
    LongBreak,
}

impl From<PhaseArg> for TimerType {
    fn from(value: PhaseArg) -> Self {
        match value {
            PhaseArg::Work => TimerType::Work,
            PhaseArg::ShortBreak => TimerType::ShortBreak,
            PhaseArg::LongBreak => TimerType::LongBreak,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Convert CLI command to IPC command
    let mut json = false;
    let command = match cli.command {
        Commands::Start => Command::Start,
        Commands::Stop => Command::Stop,
        Commands::Resume => Command::Resume,
        Commands::Reset => Command::Reset,
        Commands::Status { json: raw } => {
            json = raw;
            Command::Status
        }
        Commands::Task {
            description,
            category,
        } => Command::SetTask {
            description,
            category: category.map(Category::from),
        },
        Commands::Duration { phase, length } => Command::SetDuration {
            timer_type: phase.into(),
            seconds: parse_length(&length)?,
        },
    };

    let response = send_command(&cli.socket, &command).await?;

    match response {
        Response::Ok => println!("OK"),
        Response::Status(status) if json => println!("{}", serde_json::to_string_pretty(&status)?),
        Response::Status(status) => print_status(&status),
        Response::Error(e) => bail!(e),
    }

    Ok(())
}

fn print_status(status: &TimerStatus) {
    let state = match status.state {
        PhaseStatus::Idle => "idle",
        PhaseStatus::AwaitingServerAck => "starting",
        PhaseStatus::Running => "running",
        PhaseStatus::Paused => "paused",
    };
    println!("Phase:     {} ({})", status.timer_type, state);
    println!(
        "Remaining: {:02}:{:02} of {:02}:{:02}",
        status.remaining / 60,
        status.remaining % 60,
        status.duration / 60,
        status.duration % 60
    );
    println!(
        "Step:      {}/8, {} pomodoros done",
        status.step + 1,
        status.completed_work_sessions
    );
    if !status.description.is_empty() {
        println!("Task:      {} [{}]", status.description, status.category);
    }
    match status.sequence_id {
        Some(id) => println!("Session:   #{}", id),
        None => println!("Session:   not started"),
    }
    println!(
        "Server:    {}",
        if status.connected { "connected" } else { "offline" }
    );
}

/// `25` is minutes, `4:30` is minutes and seconds.
fn parse_length(input: &str) -> Result<u32> {
    let seconds = match input.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: u32 = minutes.trim().parse().context("invalid minutes")?;
            let seconds: u32 = seconds.trim().parse().context("invalid seconds")?;
            if seconds >= 60 {
                bail!("seconds must be below 60");
            }
            minutes * 60 + seconds
        }
        None => input.trim().parse::<u32>().context("invalid minutes")? * 60,
    };
    if seconds == 0 {
        bail!("length must be greater than zero");
    }
    Ok(seconds)
}

async fn send_command(socket: &Path, cmd: &Command) -> Result<Response> {
    let stream = UnixStream::connect(socket).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => IpcError::ConnectionRefused,
        _ => IpcError::Io(e),
    })?;
    let (reader, mut writer) = stream.into_split();

    write_message(&mut writer, cmd).await?;
    let response = read_message(&mut BufReader::new(reader)).await?;

    Ok(response)
}
