mod account;
mod play;

use std::{io, path::PathBuf, process, sync::Arc};

use clap::{Parser, Subcommand, ValueEnum};
use env_logger::{Builder, Env};
use guessr_core::{
    catalog::FileCatalog,
    config::Config,
    error::Error,
    item::{Genre, ItemKind},
    preview::Preview,
};

use crate::play::Game;

const ENV_LOG: &str = "GUESSR_LOG";
const ENV_LOG_STYLE: &str = "GUESSR_LOG_STYLE";

#[derive(Parser)]
#[command(name = "guessr", version, about = "Guess which one is more popular")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a game
    Play {
        /// artists, albums or tracks
        #[arg(value_parser = parse_kind)]
        mode: ItemKind,
        #[arg(long, default_value = "all", value_parser = parse_genre)]
        genre: Genre,
    },
    /// Sign in with the configured identity provider
    Login,
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Delete the signed-in user's account and sign out
    DeleteAccount,
    /// Add catalog items from music links (admins only)
    Ingest {
        links: Vec<String>,
        /// Read additional links from a file, one per line
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Mute or unmute previews, toggles without an argument
    Mute { state: Option<Toggle> },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

fn parse_kind(value: &str) -> Result<ItemKind, String> {
    value.parse().map_err(|err: Error| err.to_string())
}

fn parse_genre(value: &str) -> Result<Genre, String> {
    value.parse().map_err(|err: Error| err.to_string())
}

fn main() {
    // Setup logging from the env variables, with defaults.
    Builder::from_env(
        Env::new()
            .filter_or(ENV_LOG, "info")
            .write_style(ENV_LOG_STYLE),
    )
    .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        log::error!("{}", err);
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let mut config = Config::load()?.unwrap_or_default();

    match cli.command {
        None => println!("{}", account::HOME_SCREEN),
        Some(Command::Play { mode, genre }) => {
            let catalog = FileCatalog::open(config.catalog_dir()?)?;
            let stdin = io::stdin();
            Game::new(
                Arc::new(catalog),
                config.sampling,
                mode,
                genre,
                Preview::new(config.muted),
                stdin.lock(),
                io::stdout(),
            )
            .run()?;
        }
        Some(Command::Login) => account::login(&config)?,
        Some(Command::Logout) => account::logout(&config)?,
        Some(Command::Whoami) => account::whoami(&config)?,
        Some(Command::DeleteAccount) => account::delete_account(&config, io::stdin().lock())?,
        Some(Command::Ingest { links, file }) => account::ingest(&config, links, file.as_deref())?,
        Some(Command::Mute { state }) => {
            let muted = state.map(|state| matches!(state, Toggle::On));
            account::mute(&mut config, muted)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn play_accepts_mode_and_genre() {
        let cli = Cli::try_parse_from(["guessr", "play", "tracks", "--genre", "k-pop"]).unwrap();
        match cli.command {
            Some(Command::Play { mode, genre }) => {
                assert_eq!(mode, ItemKind::Track);
                assert_eq!(genre, Genre::KPop);
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn delete_account_is_kebab_case() {
        let cli = Cli::try_parse_from(["guessr", "delete-account"]).unwrap();
        assert!(matches!(cli.command, Some(Command::DeleteAccount)));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["guessr", "play", "podcasts"]).is_err());
    }

    #[test]
    fn genre_defaults_to_all() {
        let cli = Cli::try_parse_from(["guessr", "play", "artists"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Play {
                genre: Genre::All,
                ..
            })
        ));
    }
}
