use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pomosync::app::App;
use pomosync::channel::{ConnectOutcome, StompChannel};
use pomosync::config::{load_config, Config};
use pomosync::credential::CookieSource;
use pomosync::engine::{Engine, EngineHandle, Intent};
use pomosync::ipc::server;
use pomosync::notify::DesktopNotifier;
use pomosync::persistence::{data_dir, Persistence};
use pomosync::session::Sequencer;
use pomosync::settings::SettingsClient;
use pomosync::ui;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "pomosync")]
#[command(about = "Pomodoro timer synced with your productivity server", long_about = None)]
struct Args {
    /// Run without the terminal view, controlled through pomosyncctl
    #[arg(long)]
    headless: bool,

    /// Config file (defaults to the per-user pomosync.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control socket path
    #[arg(long, default_value = pomosync_ipc::SOCKET_PATH)]
    socket: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.headless)?;

    let config = load_config(args.config.as_deref())?;
    let persistence = Persistence::default_location()?;
    let sequencer = match persistence.load() {
        Ok(Some(record)) => {
            info!(step = record.step, sequence_id = ?record.sequence_id, "restored session");
            Sequencer::from_record(&record)
        }
        Ok(None) => Sequencer::new(config.durations),
        Err(e) => {
            warn!("ignoring unreadable session state: {:#}", e);
            Sequencer::new(config.durations)
        }
    };

    let credential = config.auth.cookie_source();
    let mut channel = StompChannel::new(config.server.channel_config(), credential.clone());
    let link = channel.status();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    match channel.connect(events_tx) {
        ConnectOutcome::Started | ConnectOutcome::AlreadyConnected => {}
        ConnectOutcome::MissingCredential => {
            warn!("running offline: sign in on the web app and export the access token cookie")
        }
    }

    let (handle, engine) = Engine::new(sequencer, channel)
        .with_notifier(DesktopNotifier)
        .with_persistence(persistence)
        .spawn(events_rx, link);

    let settings = tokio::spawn(fetch_settings(
        SettingsClient::new(&config.server.base_url),
        credential,
        handle.clone(),
    ));
    let ipc = tokio::spawn({
        let handle = handle.clone();
        let socket = args.socket.clone();
        async move {
            if let Err(e) = server::serve(handle, socket).await {
                error!("IPC server stopped: {:#}", e);
            }
        }
    });

    if args.headless {
        info!("running headless, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        drop(handle);
    } else {
        let res = tokio::task::spawn_blocking(move || run_tui(handle, config))
            .await
            .context("terminal view panicked")?;
        if let Err(err) = res {
            eprintln!("Error: {:?}", err);
        }
    }

    ipc.abort();
    settings.abort();
    let _ = std::fs::remove_file(&args.socket);

    let mut channel = engine.await.context("engine task failed")?;
    channel.disconnect().await;
    info!("pomosync stopped");
    Ok(())
}

/// Terminal view logs to a file so the alternate screen stays clean.
fn init_logging(headless: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if headless {
        registry
            .with(fmt::layer().with_writer(io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
        return Ok(());
    }

    let dir = data_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory at {:?}", dir))?;
    let path = dir.join("pomosync.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file at {:?}", path))?;
    registry
        .with(fmt::layer().with_writer(Arc::new(file)).with_ansi(false))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    Ok(())
}

async fn fetch_settings(client: SettingsClient, credential: CookieSource, handle: EngineHandle) {
    let Some(token) = credential.token() else {
        return;
    };
    match client.fetch(&token).await {
        Ok(setting) => {
            info!(
                timer_type = %setting.timer_type,
                seconds = setting.duration_seconds,
                "loaded pomodoro settings"
            );
            if handle.send(Intent::ApplySettings(vec![setting])).is_err() {
                warn!("engine stopped before settings arrived");
            }
        }
        Err(e) => warn!("could not load pomodoro settings: {}", e),
    }
}

fn run_tui(handle: EngineHandle, config: Config) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, App::new(handle, config));

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    loop {
        app.refresh();
        terminal.draw(|f| ui::draw(f, &app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
