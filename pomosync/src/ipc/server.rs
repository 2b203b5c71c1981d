//! Unix domain socket server for IPC

use crate::engine::{EngineHandle, Intent};
use anyhow::{Context, Result};
use pomosync_ipc::{read_message, write_message, Command, Response, TimerStatus};
use std::path::Path;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

pub async fn serve(handle: EngineHandle, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    // Remove a stale socket left by a previous run
    let _ = std::fs::remove_file(path);

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind control socket at {:?}", path))?;
    info!("IPC server listening on {}", path.display());

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, handle).await {
                        error!("Error handling client: {:#}", e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_client(stream: UnixStream, handle: EngineHandle) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let command: Command = read_message(&mut reader).await?;
    debug!(?command, "control command");
    let response = respond(&handle, command);
    write_message(&mut writer, &response).await?;

    Ok(())
}

fn respond(handle: &EngineHandle, command: Command) -> Response {
    let intents = match command {
        Command::Status => return Response::Status(TimerStatus::from(&handle.snapshot())),
        Command::Start => vec![Intent::Start],
        Command::Stop => vec![Intent::Stop],
        Command::Resume => vec![Intent::Resume],
        Command::Reset => vec![Intent::Reset],
        Command::SetTask {
            description,
            category,
        } => {
            if handle.snapshot().description_locked {
                return Response::Error(
                    "the task cannot change while a work phase is in progress".to_string(),
                );
            }
            let mut intents = vec![Intent::SetDescription(description)];
            intents.extend(category.map(Intent::SetCategory));
            intents
        }
        Command::SetDuration {
            timer_type,
            seconds,
        } => {
            if seconds == 0 {
                return Response::Error("duration must be at least one second".to_string());
            }
            vec![Intent::SetDuration {
                timer_type,
                seconds,
            }]
        }
    };

    for intent in intents {
        if let Err(e) = handle.send(intent) {
            return Response::Error(e.to_string());
        }
    }
    Response::Ok
}
