use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Medbot: a command-line medical assistant.
/// Answers questions about the heart disease, cancer and diabetes datasets and
/// general medical topics. Starts an interactive session by default.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase message verbosity.
    ///
    /// Specify multiple times for more verbose output:
    ///  -v:  INFO level
    ///  -vv: DEBUG level
    ///  -vvv: TRACE level (most verbose)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a Medbot.toml file. By default the current directory and its
    /// parents are searched, then the built-in configuration is used.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Ask a single question non-interactively.
    #[arg(short, long)]
    pub turn: Option<String>,

    /// Render answers as markdown.
    #[arg(short, long)]
    pub markdown: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the dataset CSV files into the SQLite databases.
    Ingest {
        /// Directory containing heart.csv, cancer.csv and diabetes.csv.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        /// Where to write the databases. Defaults to the configured datasets directory.
        #[arg(long)]
        db_dir: Option<PathBuf>,
    },
    /// List the tools available to the assistant.
    Tools {
        /// Print the full tool schemas as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interactive_defaults() {
        let cli = Cli::try_parse_from(["medbot"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert!(cli.turn.is_none());
        assert!(!cli.markdown);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_single_turn_with_verbosity() {
        let cli = Cli::try_parse_from(["medbot", "-vv", "--turn", "What is a stroke?"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.turn.as_deref(), Some("What is a stroke?"));
    }

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::try_parse_from(["medbot", "ingest", "--db-dir", "out"]).unwrap();
        match cli.command {
            Some(Commands::Ingest { data_dir, db_dir }) => {
                assert_eq!(data_dir, PathBuf::from("data"));
                assert_eq!(db_dir, Some(PathBuf::from("out")));
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }
}
