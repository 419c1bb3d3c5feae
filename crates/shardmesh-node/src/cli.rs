use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "shardmesh")]
#[command(about = "shardmesh compute node")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (defaults to shardmesh.toml when present)
    #[arg(short, long, global = true, env = "SHARDMESH_CONFIG")]
    pub config: Option<String>,

    /// Log level override (e.g. debug, shardmesh_mode=trace)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Default)]
pub enum Commands {
    /// Join the cluster and follow configuration changes until Ctrl-C
    #[default]
    Run,
    /// Validate the configuration and exit
    Check,
    /// Print the effective configuration as TOML
    PrintConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_is_default() {
        let cli = Cli::try_parse_from(["shardmesh"]).unwrap();
        assert!(cli.command.is_none());
        assert!(matches!(cli.command.unwrap_or_default(), Commands::Run));
    }

    #[test]
    fn test_global_flags() {
        let cli =
            Cli::try_parse_from(["shardmesh", "print-config", "--config", "node.toml", "-l", "debug"])
                .unwrap();
        assert!(matches!(cli.command, Some(Commands::PrintConfig)));
        assert_eq!(cli.config.as_deref(), Some("node.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
