use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use reconcile::UpdatePolicy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge cloud resources toward a declarative description", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: <config dir>/config.toml)
    #[arg(long, global = true, env = "STRATUS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or update resources so they match the desired-state document
    Deploy(RunArgs),

    /// Destroy every tracked resource
    Destroy {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show what deploy would do without calling any provider
    Plan(RunArgs),

    /// Inspect the state document
    #[command(subcommand)]
    State(StateCommand),

    /// Serve deploy and destroy over HTTP
    Serve {
        /// Address to listen on (default: server.bind from config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Desired-state document (YAML, TOML or JSON)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// When tracked resources are updated in place
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Update every tracked resource that supports it
    Presence,
    /// Update only when attributes changed since the last apply
    Attributes,
}

impl From<PolicyArg> for UpdatePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Presence => Self::OnPresence,
            PolicyArg::Attributes => Self::OnAttributeChange,
        }
    }
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// Print tracked resources
    Show {
        /// Print the raw JSON document
        #[arg(long)]
        json: bool,
    },
    /// Print where the state document is stored
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::parse_from(["stratus", "-vv", "deploy", "-f", "infra.toml", "--policy", "attributes"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Deploy(args) => {
                assert_eq!(args.file, Some(PathBuf::from("infra.toml")));
                assert_eq!(args.policy, Some(PolicyArg::Attributes));
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_parse_destroy_yes() {
        let cli = Cli::parse_from(["stratus", "destroy", "--yes", "--config", "/tmp/c.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Command::Destroy { yes: true }));
    }

    #[test]
    fn test_policy_conversion() {
        assert_eq!(UpdatePolicy::from(PolicyArg::Presence), UpdatePolicy::OnPresence);
        assert_eq!(
            UpdatePolicy::from(PolicyArg::Attributes),
            UpdatePolicy::OnAttributeChange
        );
    }
}
