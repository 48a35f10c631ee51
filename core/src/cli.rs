use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(value_name = "TARGETS", help = "Targets to build (defaults from kiln.toml)")]
    pub targets: Vec<String>,

    #[arg(
        short = 'C',
        long = "directory",
        value_name = "DIR",
        help = "Project directory"
    )]
    pub source_dir: Option<PathBuf>,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Print fresh targets; repeat for debug logs")]
    pub verbose: u8,

    #[arg(long, help = "Disable coloured output")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Initialize a new kiln.toml configuration")]
    Init {
        #[arg(long, help = "Overwrite an existing kiln.toml")]
        force: bool,
    },

    #[command(about = "List rule patterns in match order")]
    Rules,
}

impl Cli {
    pub fn source_directory(&self) -> std::io::Result<PathBuf> {
        match &self.source_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir(),
        }
    }

    /// Tracing filter directive for the requested verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 | 1 => "kiln=warn,kiln_core=warn",
            2 => "kiln=debug,kiln_core=debug",
            _ => "kiln=trace,kiln_core=trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets_and_flags() {
        let cli = Cli::parse_from(["kiln", "-C", "proj", "-vv", "app", "lib.a"]);
        assert_eq!(cli.targets, vec!["app", "lib.a"]);
        assert_eq!(cli.source_dir, Some(PathBuf::from("proj")));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_filter(), "kiln=debug,kiln_core=debug");
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["kiln", "init", "--force"]);
        assert!(matches!(cli.command, Some(Commands::Init { force: true })));

        let cli = Cli::parse_from(["kiln", "rules"]);
        assert!(matches!(cli.command, Some(Commands::Rules)));
    }
}
