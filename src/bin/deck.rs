use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deck::{
    audio::{scanner::Resolution, EnqueueMode},
    config::Config,
    logging::init_logging,
    playback::{Command, CommandChannel, QueueManager, StateStore},
    store::SharedStore,
    ui::listing::Listing,
};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "deck")]
#[command(version, about = "Queue-driven terminal music player")]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging, and keep stderr attached while spinning
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one file and exit
    Play { file: PathBuf },
    /// Run the player: play the queue until told to quit
    Spin,
    /// Add files, directories or playlists to the queue (`-` reads paths from stdin)
    Queue {
        #[arg(long)]
        clear: bool,
        #[arg(long)]
        prepend: bool,
        #[arg(long)]
        remove: bool,
        paths: Vec<PathBuf>,
    },
    /// Pause or resume
    Pause,
    /// Finish the current track now (counts as played)
    Next,
    /// Go back to the last played track
    Previous,
    /// Stop; the current track goes back to the head of the queue
    Stop,
    /// Abandon the current track
    Skip,
    /// Tell the player to exit
    Quit,
    /// Play these now, then carry on with the current track
    Interrupt {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    ShowQueue {
        /// Redraw every N seconds
        #[arg(long, default_value_t = 0)]
        repeat: u64,
    },
    ShowPrevious {
        #[arg(long, default_value_t = 0)]
        repeat: u64,
    },
    ShowPlaying,
    ShowSummary {
        #[arg(long, default_value_t = 0)]
        repeat: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load()?,
    };

    let _log_guard = init_logging(&config.logging.directory, cli.verbose)?;
    debug!("Config loaded, store at {}", config.store.database_path.display());

    let store = SharedStore::open(&config.store).context("opening the shared store")?;
    let queue = QueueManager::with_history_limit(store.clone(), config.player.recently_played_limit);
    let commands = CommandChannel::new(store.clone());

    match cli.command {
        Commands::Play { file } => play(file, store, config, cli.verbose).await?,
        Commands::Spin => spin(store, config, cli.verbose).await?,
        Commands::Queue {
            clear,
            prepend,
            remove,
            paths,
        } => {
            if clear {
                queue.clear()?;
            }
            if remove {
                let removed = queue.remove(&paths)?;
                info!("Removed {} queued entries", removed);
            } else if !paths.is_empty() {
                let mode = if prepend {
                    EnqueueMode::Prepend
                } else {
                    EnqueueMode::Append
                };
                enqueue(&queue, &paths, mode)?;
            }
        }
        Commands::Pause => commands.send(Command::Pause)?,
        Commands::Next => commands.send(Command::Next)?,
        Commands::Previous => commands.send(Command::Previous)?,
        Commands::Stop => commands.send(Command::Stop)?,
        Commands::Skip => commands.send(Command::Skip)?,
        Commands::Quit => commands.send(Command::Quit)?,
        Commands::Interrupt { paths } => {
            let resolution = queue.interrupt(&paths, io::stdin().lock(), &commands)?;
            report_failures(&resolution)?;
        }
        Commands::ShowQueue { repeat } => {
            let mut listing = Listing::new(queue, StateStore::new(store));
            listing.repeat(&mut io::stdout().lock(), repeat, |l, out| l.write_queue(out, -1))?;
        }
        Commands::ShowPrevious { repeat } => {
            let mut listing = Listing::new(queue, StateStore::new(store));
            listing.repeat(&mut io::stdout().lock(), repeat, |l, out| {
                l.write_previous(out, -1)
            })?;
        }
        Commands::ShowPlaying => {
            let listing = Listing::new(queue, StateStore::new(store));
            listing.write_playing(&mut io::stdout().lock())?;
        }
        Commands::ShowSummary { repeat } => {
            let mut listing = Listing::new(queue, StateStore::new(store));
            listing.repeat(&mut io::stdout().lock(), repeat, |l, out| l.write_summary(out))?;
        }
    }

    Ok(())
}

/// Enqueue and report every path that could not be used; the rest still go in.
fn enqueue(queue: &QueueManager, paths: &[PathBuf], mode: EnqueueMode) -> Result<()> {
    let resolution = queue.enqueue_with_stdin(paths, mode, io::stdin().lock())?;
    report_failures(&resolution)?;
    info!("Queued {} track(s)", resolution.tracks.len());
    Ok(())
}

fn report_failures(resolution: &Resolution) -> Result<()> {
    let mut stdout = io::stdout().lock();
    for (path, e) in &resolution.failures {
        debug!("Not queued {}: {}", path.display(), e);
        writeln!(stdout, "** {e}")?;
    }
    Ok(())
}

#[cfg(feature = "audio")]
async fn play(file: PathBuf, store: SharedStore, config: Config, verbose: bool) -> Result<()> {
    use deck::playback::restore_volume;

    let track = deck::audio::Track::from_path(&file)?;
    tokio::task::spawn_blocking(move || -> Result<()> {
        let _stderr = silence_stderr(verbose);
        let mut player = player::build(store, &config)?;
        restore_volume(&mut *player)?;
        player.play_file(&track)?;
        Ok(())
    })
    .await??;
    Ok(())
}

#[cfg(feature = "audio")]
async fn spin(store: SharedStore, config: Config, verbose: bool) -> Result<()> {
    use deck::playback::recover;

    start_scrobbler(store.clone(), &config);
    let _nfc = deck::nfc::spawn(store.clone(), &config.nfc);

    tokio::task::spawn_blocking(move || -> Result<()> {
        let _stderr = silence_stderr(verbose);
        let mut player = player::build(store, &config)?;
        let report = recover(&mut *player)?;
        if let Some(track) = &report.requeued {
            info!("Resuming {} after unclean shutdown", track.file.display());
        }
        player.print_key_legend();
        player.spin()?;
        Ok(())
    })
    .await??;
    Ok(())
}

#[cfg(not(feature = "audio"))]
async fn play(_file: PathBuf, _store: SharedStore, _config: Config, _verbose: bool) -> Result<()> {
    anyhow::bail!("deck was built without the `audio` feature")
}

#[cfg(not(feature = "audio"))]
async fn spin(_store: SharedStore, _config: Config, _verbose: bool) -> Result<()> {
    anyhow::bail!("deck was built without the `audio` feature")
}

#[cfg(feature = "audio")]
mod player {
    use anyhow::Result;
    use deck::{
        audio::RodioPipeline,
        config::Config,
        playback::Player,
        store::SharedStore,
        ui::{KeySource, NoKeys, TerminalConsole, TerminalKeys, TerminalManager},
    };
    use std::io::IsTerminal;

    /// Terminal-attached player. Raw mode lasts as long as the player does.
    pub struct TerminalPlayer {
        player: Player<RodioPipeline>,
        _terminal: Option<TerminalManager>,
    }

    impl std::ops::Deref for TerminalPlayer {
        type Target = Player<RodioPipeline>;

        fn deref(&self) -> &Self::Target {
            &self.player
        }
    }

    impl std::ops::DerefMut for TerminalPlayer {
        fn deref_mut(&mut self) -> &mut Self::Target {
            &mut self.player
        }
    }

    /// Must run on the thread that will drive playback: the audio output
    /// stream cannot move between threads.
    pub fn build(store: SharedStore, config: &Config) -> Result<TerminalPlayer> {
        let pipeline = RodioPipeline::new()?;

        // without a terminal (service mode) there are no keys, only commands
        let interactive = std::io::stdin().is_terminal();
        let terminal = if interactive {
            Some(TerminalManager::new()?)
        } else {
            None
        };
        let keys: Box<dyn KeySource> = if interactive {
            Box::new(TerminalKeys)
        } else {
            Box::new(NoKeys)
        };

        let player = Player::new(
            pipeline,
            store,
            keys,
            Box::new(TerminalConsole::new()),
            config.player.clone(),
        );
        Ok(TerminalPlayer {
            player,
            _terminal: terminal,
        })
    }
}

#[cfg(feature = "audio")]
fn silence_stderr(verbose: bool) -> Option<deck::logging::StderrRedirect> {
    if verbose {
        return None;
    }
    match deck::logging::redirect_stderr_to_null() {
        Ok(redirect) => Some(redirect),
        Err(e) => {
            tracing::warn!("Keeping stderr: {}", e);
            None
        }
    }
}

#[cfg(all(feature = "audio", feature = "scrobble"))]
fn start_scrobbler(store: SharedStore, config: &Config) {
    use deck::scrobble::{ListenBrainzClient, Scrobbler};

    if !config.scrobble.enabled {
        debug!("Scrobbling disabled in config");
        return;
    }
    let Some(token) = config.scrobble.resolved_token() else {
        tracing::warn!(
            "No ListenBrainz token (set {}); scrobbling disabled",
            deck::config::TOKEN_ENV
        );
        println!("** no ListenBrainz token; scrobbling disabled.");
        return;
    };
    let client = match ListenBrainzClient::new(&config.scrobble.api_url, &token) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Scrobbler not started: {}", e);
            return;
        }
    };

    let scrobbler = Scrobbler::new(client, store, &config.scrobble);
    tokio::spawn(async move {
        if let Err(e) = scrobbler.run().await {
            tracing::error!("Scrobbling stopped: {}", e);
        }
    });
}

#[cfg(all(feature = "audio", not(feature = "scrobble")))]
fn start_scrobbler(_store: SharedStore, _config: &Config) {
    debug!("Built without the `scrobble` feature");
}
