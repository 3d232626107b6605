use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

use spotify_console_token::browser::HeadlessConsole;
use spotify_console_token::cache::TokenCache;
use spotify_console_token::config::{AppConfig, LoadedConfig};
use spotify_console_token::console::ConsoleError;
use spotify_console_token::logging::{init_logging, LoggingConfig};
use spotify_console_token::resolve::{
    TerminalPrompt, TokenAcquirer, TokenPrompt, TokenResolver,
};
use spotify_console_token::snapshot::save_snapshot;
use spotify_console_token::spotify::{parse_playlist_id, SpotifyClient};
use spotify_console_token::token::Token;

/// Fetch a Spotify Web API bearer token by signing in to the developer console
/// in a headless browser.
#[derive(Parser)]
#[command(name = "spotify-console-token", version, about)]
struct Cli {
    /// Config file (defaults to ./console-token.toml or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print a working bearer token
    Token {
        /// Show the browser window
        #[arg(long)]
        headed: bool,
        /// Neither read nor write the token cache
        #[arg(long)]
        no_cache: bool,
        /// Ignore any cached token and sign in again
        #[arg(long)]
        fresh: bool,
        /// Only run the console sign-in and print whatever token it issues
        #[arg(long, conflicts_with_all = ["no_cache", "fresh"])]
        raw: bool,
    },
    /// List the tracks of a playlist
    Tracks {
        /// Playlist id, spotify: URI, or open.spotify.com URL
        playlist: String,
        /// Use this bearer token instead of resolving one
        #[arg(long)]
        bearer: Option<String>,
        /// Print the playlist as JSON
        #[arg(long)]
        json: bool,
        /// Also write a dated JSON snapshot under this directory
        #[arg(long)]
        save: Option<PathBuf>,
        /// Show the browser window if a sign-in is needed
        #[arg(long)]
        headed: bool,
        /// Neither read nor write the token cache
        #[arg(long)]
        no_cache: bool,
    },
}

/// A `--bearer` value, rejected when blank rather than silently ignored.
fn explicit_bearer(raw: Option<&str>) -> Result<Option<Token>, String> {
    match raw {
        None => Ok(None),
        Some(raw) => Token::parse(raw)
            .map(Some)
            .ok_or_else(|| "--bearer must not be blank".to_string()),
    }
}

struct TokenOptions {
    headed: bool,
    read_cache: bool,
    write_cache: bool,
    explicit: Option<Token>,
}

async fn resolve_token(
    config: &AppConfig,
    options: TokenOptions,
) -> Result<Token, Box<dyn std::error::Error>> {
    let api = SpotifyClient::new(config.api.base_url.clone());
    let cache = (options.write_cache && config.cache.enabled)
        .then(|| TokenCache::new(config.cache_path()));

    let console = match config.credentials() {
        Some(credentials) => Some(
            HeadlessConsole::new(config, credentials)
                .headed(options.headed)
                .with_progress(::console::Term::stderr().is_term()),
        ),
        None => {
            info!("No credentials configured, skipping console sign-in");
            None
        }
    };
    let prompt = std::io::stdin().is_terminal().then_some(TerminalPrompt);

    let resolution = TokenResolver::new(&api)
        .with_cache(cache.as_ref())
        .with_acquirer(console.as_ref().map(|c| c as &dyn TokenAcquirer))
        .with_prompt(prompt.as_ref().map(|p| p as &dyn TokenPrompt))
        .resolve(options.explicit, options.read_cache)
        .await?;

    info!("Using bearer token from {:?}", resolution.source);
    Ok(resolution.token)
}

async fn run(cli: Cli, config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let command = cli.command.unwrap_or(Command::Token {
        headed: false,
        no_cache: false,
        fresh: false,
        raw: false,
    });

    match command {
        Command::Token {
            headed,
            raw: true,
            ..
        } => {
            let credentials = config.credentials().ok_or(ConsoleError::MissingCredentials)?;
            let token = HeadlessConsole::new(&config, credentials)
                .headed(headed)
                .with_progress(::console::Term::stderr().is_term())
                .acquire()
                .await?;
            println!("{}", token.as_str());
        }
        Command::Token {
            headed,
            no_cache,
            fresh,
            raw: false,
        } => {
            let options = TokenOptions {
                headed,
                read_cache: !no_cache && !fresh,
                write_cache: !no_cache,
                explicit: None,
            };
            let token = resolve_token(&config, options).await?;
            println!("{}", token.as_str());
        }
        Command::Tracks {
            playlist,
            bearer,
            json,
            save,
            headed,
            no_cache,
        } => {
            let explicit = explicit_bearer(bearer.as_deref())?;
            let playlist_id = parse_playlist_id(&playlist)?;
            let options = TokenOptions {
                headed,
                read_cache: !no_cache,
                write_cache: !no_cache,
                explicit,
            };
            let token = resolve_token(&config, options).await?;

            let api = SpotifyClient::new(config.api.base_url.clone());
            let playlist = api.playlist(&token, &playlist_id).await?;
            info!(
                "Fetched '{}' with {} tracks",
                playlist.name,
                playlist.tracks.len()
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&playlist)?);
            } else {
                println!("{}", playlist.name);
                for track in &playlist.tracks {
                    println!("{:>3}. {} - {}", track.number, track.title, track.artist);
                }
            }

            if let Some(root) = save {
                let today = chrono::Local::now().date_naive();
                let path = save_snapshot(&root, &playlist, today).await?;
                eprintln!("Saved playlist snapshot to {}", path.display());
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv();
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => match AppConfig::from_path(path) {
            Ok(config) => LoadedConfig {
                config,
                source: Some(path.clone()),
                skipped: Vec::new(),
            },
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => AppConfig::load(),
    };
    let config = loaded.config;

    let mut logging = LoggingConfig::from(&config.logging);
    logging.verbose = cli.verbose;
    let _guard = match init_logging(logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    for skipped in &loaded.skipped {
        warn!("Skipping config file: {}", skipped);
    }
    match &loaded.source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
