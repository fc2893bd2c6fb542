use crate::shutdown::parse_duration;
use crate::tracing::TracingFormat;
use clap::{Args, Parser, Subcommand};
use shipwright_core::RunOptions;
use shipwright_core::context::DEFAULT_PARALLELISM;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "shipwright")]
#[command(about = "Build, archive, checksum, sign and publish releases from a tagged repository")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable debug logging")]
    pub debug: bool,

    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Run the release pipeline")]
    Release(ReleaseArgs),
    #[command(about = "Validate the configuration file")]
    Check {
        #[arg(long, short = 'f', help = "Configuration file to check")]
        config: Option<PathBuf>,
        #[arg(long, help = "Print the configuration with defaults applied")]
        print: bool,
    },
    #[command(about = "Write an example configuration file")]
    Init {
        #[arg(
            long,
            short = 'f',
            help = "Where to write the configuration",
            default_value = ".shipwright.yml"
        )]
        config: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ReleaseArgs {
    #[arg(long, short = 'f', help = "Configuration file, searched for if omitted")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Build a snapshot: no validation, no publishing")]
    pub snapshot: bool,

    #[arg(long, help = "Skip git state validation")]
    pub skip_validate: bool,

    #[arg(long, help = "Build and package without publishing")]
    pub skip_publish: bool,

    #[arg(long, help = "Do not sign artifacts")]
    pub skip_sign: bool,

    #[arg(long, help = "Remove the dist directory before building")]
    pub rm_dist: bool,

    #[arg(
        long,
        short = 'p',
        help = "Maximum number of concurrent tasks per stage",
        default_value_t = DEFAULT_PARALLELISM
    )]
    pub parallelism: usize,

    #[arg(long, help = "Use this file as release notes instead of generating a changelog")]
    pub release_notes: Option<PathBuf>,

    #[arg(
        long,
        help = "Cancel the release after this long (e.g. 90s, 30m, 1h)",
        default_value = "30m",
        value_parser = parse_duration
    )]
    pub timeout: Duration,
}

impl ReleaseArgs {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            snapshot: self.snapshot,
            skip_validate: self.skip_validate,
            skip_publish: self.skip_publish,
            skip_sign: self.skip_sign,
            rm_dist: self.rm_dist,
            parallelism: self.parallelism,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_defaults() {
        let cli = Cli::try_parse_from(["shipwright", "release"]).unwrap();
        assert!(!cli.debug);
        assert_eq!(cli.log_format, TracingFormat::Compact);
        let Commands::Release(args) = cli.command else {
            panic!("expected release");
        };
        assert_eq!(args.timeout, Duration::from_secs(1800));
        let options = args.run_options();
        assert_eq!(options.parallelism, DEFAULT_PARALLELISM);
        assert!(!options.snapshot && !options.rm_dist);
    }

    #[test]
    fn test_release_flags() {
        let cli = Cli::try_parse_from([
            "shipwright",
            "--debug",
            "release",
            "--snapshot",
            "--skip-sign",
            "--rm-dist",
            "-p",
            "8",
            "--timeout",
            "90s",
            "-f",
            "custom.yml",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.log_format, TracingFormat::Json);
        let Commands::Release(args) = cli.command else {
            panic!("expected release");
        };
        assert_eq!(args.config, Some(PathBuf::from("custom.yml")));
        assert_eq!(args.timeout, Duration::from_secs(90));
        let options = args.run_options();
        assert!(options.snapshot && options.skip_sign && options.rm_dist);
        assert!(!options.skip_publish);
        assert_eq!(options.parallelism, 8);
    }

    #[test]
    fn test_invalid_timeout() {
        assert!(Cli::try_parse_from(["shipwright", "release", "--timeout", "soon"]).is_err());
    }

    #[test]
    fn test_check_and_init() {
        let cli = Cli::try_parse_from(["shipwright", "check", "--print"]).unwrap();
        assert!(matches!(cli.command, Commands::Check { print: true, config: None }));
        let cli = Cli::try_parse_from(["shipwright", "init"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Init { ref config } if config == &PathBuf::from(".shipwright.yml")
        ));
    }
}
