// dashqoe command-line arguments
// (c) 2024 Ross Younger

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Configuration_Optional;
use crate::eval::parse_operator_label;
use crate::protocol::Protocol;

#[derive(Debug, Parser, Clone)]
#[command(
    author,
    version(env!("DASHQOE_VERSION_STRING")),
    about,
    before_help = "e.g.   dashqoe run --quic lab-server:4433 10\n       dashqoe eval results/",
    infer_long_args(true)
)]
#[command(help_template(
    "\
{name} version {version}
{about-with-newline}
{usage-heading} {usage}
{before-help}
{all-args}{after-help}
"
))]
#[command(styles=super::styles::CLAP_STYLES)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Quiet mode
    ///
    /// Switches off progress display; reports only errors
    #[arg(short, long, action, global = true, conflicts_with("debug"))]
    pub quiet: bool,

    // CONFIGURATION =======================================================================
    /// Reads an additional configuration file, which takes priority over the user and system files
    #[arg(long, global = true, value_name("FILE"), help_heading("Configuration"))]
    pub config: Option<String>,

    /// Outputs the configuration, after merging all sources, then exits
    #[arg(long, action, global = true, help_heading("Configuration"))]
    pub show_config: bool,

    /// Outputs the paths of the configuration files consulted, then exits
    #[arg(long, action, help_heading("Configuration"))]
    pub config_files: bool,

    // DEBUG ===============================================================================
    /// Enable detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=dashqoe=debug` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, action, global = true, help_heading("Debug"))]
    pub debug: bool,
    /// Prints timing profile data after completion
    #[arg(long, action, global = true, help_heading("Debug"))]
    pub profile: bool,
    /// Log to a file
    ///
    /// By default the log receives everything printed to stderr.
    /// To override this behaviour, set the environment variable `RUST_LOG_FILE_DETAIL` (same semantics as `RUST_LOG`).
    #[arg(
        short('l'),
        long,
        action,
        global = true,
        help_heading("Debug"),
        value_name("FILE")
    )]
    pub log_file: Option<String>,
}

#[derive(Debug, Subcommand, Clone)]
pub(crate) enum Command {
    /// Runs browser sessions of one protocol; the player page posts its metrics back to us
    Run(RunArgs),
    /// Runs the full lab comparison: TCP, QUIC with HyStart and QUIC with careful resume
    Experiment(ExperimentArgs),
    /// Aggregates result files into eval.csv and result.png
    Eval(EvalArgs),
}

impl Command {
    /// Lab settings entered on the command line
    pub(crate) fn configuration(&self) -> Option<&Configuration_Optional> {
        match self {
            Command::Run(a) => Some(&a.config),
            Command::Experiment(a) => Some(&a.config),
            Command::Eval(_) => None,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub(crate) struct RunArgs {
    /// Fetches over TCP (HTTP/2); QUIC is disabled in the browser
    #[arg(long, action, conflicts_with("quic"), required_unless_present("quic"))]
    pub tcp: bool,
    /// Fetches over QUIC (HTTP/3), forced on for the destination
    #[arg(long, action)]
    pub quic: bool,

    /// Destination server and port, without https, e.g. `myserver.com:443`
    #[arg(value_name = "DEST")]
    pub dest: String,
    /// Number of sessions to run
    pub iterations: u32,

    #[command(flatten)]
    pub config: Configuration_Optional,
}

impl RunArgs {
    pub(crate) fn protocol(&self) -> anyhow::Result<Protocol> {
        match (self.tcp, self.quic) {
            (true, false) => Ok(Protocol::Tcp),
            (false, true) => Ok(Protocol::QuicHystart),
            _ => anyhow::bail!("exactly one of --tcp and --quic must be given"),
        }
    }
}

#[derive(Debug, Args, Clone)]
pub(crate) struct ExperimentArgs {
    /// Confirms that the lab settings (see --show-config) are correct
    #[arg(long, action, alias("configDone"))]
    pub config_done: bool,

    /// Number of iterations; each runs one session per protocol
    pub iterations: u32,

    #[command(flatten)]
    pub config: Configuration_Optional,
}

#[derive(Debug, Args, Clone)]
pub(crate) struct EvalArgs {
    /// Directory holding result files; searched recursively
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Where to write eval.csv and result.png [default: DIR]
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Display name for an operator directory, as `DIRECTORY=LABEL`. Repeat for each;
    /// operators are listed in the order given.
    #[arg(long, value_name = "DIRECTORY=LABEL", value_parser = parse_operator_label)]
    pub operator: Vec<(String, String)>,
}

#[cfg(test)]
mod test {
    use clap::Parser as _;

    use super::{CliArgs, Command};
    use crate::protocol::Protocol;

    fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("dashqoe").chain(args.iter().copied()))
    }

    #[test]
    fn run_needs_exactly_one_mode() {
        assert!(parse(&["run", "host:443", "3"]).is_err());
        assert!(parse(&["run", "--tcp", "--quic", "host:443", "3"]).is_err());
        let args = parse(&["run", "--quic", "host:443", "3"]).unwrap();
        let Some(Command::Run(run)) = args.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(run.protocol().unwrap(), Protocol::QuicHystart);
        assert_eq!(run.dest, "host:443");
        assert_eq!(run.iterations, 3);
    }

    #[test]
    fn config_overrides_on_subcommands() {
        let args = parse(&[
            "experiment",
            "--config-done",
            "--remote-host",
            "lab@box",
            "--careful-resume-cwnd",
            "800k",
            "--ssh-options",
            "-i",
            "--ssh-options",
            "/dev/null",
            "5",
        ])
        .unwrap();
        let Some(Command::Experiment(e)) = args.command else {
            panic!("wrong subcommand");
        };
        assert!(e.config_done);
        assert_eq!(e.iterations, 5);
        assert_eq!(e.config.remote_host.as_deref(), Some("lab@box"));
        assert_eq!(e.config.careful_resume_cwnd.map(|q| *q), Some(800_000));
        assert_eq!(
            e.config.ssh_options,
            Some(vec!["-i".to_string(), "/dev/null".to_string()])
        );
        assert!(e.config.server_port.is_none());
    }

    #[test]
    fn legacy_confirmation_spelling() {
        let args = parse(&["experiment", "--configDone", "1"]).unwrap();
        assert!(matches!(args.command, Some(Command::Experiment(e)) if e.config_done));
    }

    #[test]
    fn eval_operator_labels() {
        let args = parse(&[
            "eval",
            "results",
            "--operator",
            "op9020starlink=Starlink",
            "--operator",
            "telekom5g=Telekom5G",
        ])
        .unwrap();
        let Some(Command::Eval(e)) = args.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(e.operator.len(), 2);
        assert_eq!(e.operator[0].1, "Starlink");
        assert!(parse(&["eval", "results", "--operator", "bogus"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = parse(&["eval", "results", "--debug", "--show-config"]).unwrap();
        assert!(args.debug);
        assert!(args.show_config);
        assert!(parse(&["--quiet", "--debug"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory as _;
        CliArgs::command().debug_assert();
    }
}
