use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "cogload",
    version,
    about = "EEG cognitive load and engagement indices",
    long_about = "Compute baseline-normalized theta/alpha/beta band power and the task-load,\n\
                  engagement and fatigue indices from EEG recordings (EDF, EEGLAB .set, CSV, ASCII)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Analyze every subject directory under a data directory
    Run(RunArgs),
    /// Analyze one subject from explicit recording files
    Subject(SubjectArgs),
    /// Show a recording's header and which channels each region resolves to
    Inspect(InspectArgs),
    /// Print the effective analysis configuration as JSON
    Config(ConfigArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EstimatorArg {
    Mean,
    P75,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsufficientArg {
    /// Normalize the affected band to NaN
    Nan,
    /// Skip the subject
    Skip,
}

/// Analysis parameters shared by the subcommands. Flags override the
/// configuration file, which overrides the preset.
#[derive(Args, Debug, Default, Clone)]
pub struct AnalysisArgs {
    /// Built-in parameter set (default, protocol-a, protocol-b)
    #[arg(long)]
    pub preset: Option<String>,

    /// JSON configuration file
    #[arg(long, env = "COGLOAD_CONFIG")]
    pub config: Option<String>,

    /// Sampling rate in Hz (required for CSV/ASCII, overrides the file's rate otherwise)
    #[arg(long)]
    pub sr: Option<f64>,

    /// Analysis window length in seconds
    #[arg(long)]
    pub window: Option<f64>,

    /// Use only the first N seconds of the baseline
    #[arg(long)]
    pub baseline_seconds: Option<f64>,

    /// Take the baseline from the start of the task recording
    #[arg(long, default_value_t = false)]
    pub baseline_from_task: bool,

    /// Reduction used for the baseline reference
    #[arg(long, value_enum)]
    pub estimator: Option<EstimatorArg>,

    /// What to do when a region/band has no usable baseline
    #[arg(long, value_enum)]
    pub on_insufficient: Option<InsufficientArg>,

    /// Keep only the first N channels of every recording
    #[arg(long)]
    pub max_channels: Option<usize>,

    /// Labels for recordings that store none, comma-separated in file order
    #[arg(long, value_delimiter = ',')]
    pub channel_labels: Option<Vec<String>>,

    /// Match channel labels ignoring case
    #[arg(long, default_value_t = false)]
    pub case_insensitive: bool,

    /// Process subjects, windows and channels in parallel
    #[arg(long, default_value_t = false)]
    pub parallel: bool,

    /// Only subject directories matching this glob (e.g. "S*")
    #[arg(long)]
    pub subject_glob: Option<String>,

    /// Token written for undefined values
    #[arg(long)]
    pub na_rep: Option<String>,

    /// Omit the CSV header row
    #[arg(long, default_value_t = false)]
    pub no_header: bool,
}

#[derive(Args)]
pub struct RunArgs {
    /// Directory with one sub-directory per subject
    #[arg(long)]
    pub data_dir: String,

    /// CSV output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Write a JSON run report to this file
    #[arg(long)]
    pub report: Option<String>,

    /// Suppress the summary on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    #[command(flatten)]
    pub analysis: AnalysisArgs,
}

#[derive(Args)]
pub struct SubjectArgs {
    /// Task recording
    #[arg(long)]
    pub task: String,

    /// Resting baseline recording (not needed with --baseline-from-task)
    #[arg(long)]
    pub baseline: Option<String>,

    /// Subject ID written to every row
    #[arg(long, default_value_t = 1)]
    pub id: usize,

    /// Subject name in the report (default: task file stem)
    #[arg(long)]
    pub name: Option<String>,

    /// CSV output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Write a JSON run report to this file
    #[arg(long)]
    pub report: Option<String>,

    /// Suppress the summary on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    #[command(flatten)]
    pub analysis: AnalysisArgs,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Recording file
    #[arg(long)]
    pub file: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub analysis: AnalysisArgs,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    #[command(flatten)]
    pub analysis: AnalysisArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "cogload",
            "-vv",
            "run",
            "--data-dir",
            "data",
            "--preset",
            "protocol-b",
            "--estimator",
            "p75",
            "--on-insufficient",
            "skip",
            "--parallel",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.data_dir, "data");
                assert_eq!(args.analysis.preset.as_deref(), Some("protocol-b"));
                assert_eq!(args.analysis.estimator, Some(EstimatorArg::P75));
                assert_eq!(args.analysis.on_insufficient, Some(InsufficientArg::Skip));
                assert!(args.analysis.parallel);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_channel_labels() {
        let cli = Cli::try_parse_from([
            "cogload",
            "inspect",
            "--file",
            "rec.set",
            "--channel-labels",
            "Fz,Cz,Pz",
        ])
        .unwrap();
        match cli.command {
            Command::Inspect(args) => assert_eq!(
                args.analysis.channel_labels,
                Some(vec!["Fz".to_string(), "Cz".to_string(), "Pz".to_string()])
            ),
            _ => panic!("expected inspect"),
        }
    }

    #[test]
    fn test_subject_requires_task() {
        assert!(Cli::try_parse_from(["cogload", "subject", "--baseline", "b.edf"]).is_err());
    }
}
