//! colsplit: split a spreadsheet into one workbook per distinct column value.
//!
//! For every selected column, rows are grouped by the column's distinct
//! values and each group is written to `<output>/<column>/<value>.xlsx`.

mod consumer;
mod prefs;
mod signal;
#[cfg(test)]
mod test_util;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colsplit_split::{
    EnumNameCollisionStrategy, ReportSplit, SpecSplitOptions, SplitSession, SplitSessionError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use consumer::{EnumEventFormat, consume_job};
use prefs::{C_FILE_PREFS_DEFAULT, StorePreferences};
use signal::spawn_interrupt_listener;

/// Suffix of the default output directory (`<input stem>_split`).
const C_SUFFIX_OUTPUT_DIR: &str = "_split";

/// Spreadsheet column splitter.
#[derive(Parser, Debug)]
#[command(name = "colsplit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Preferences file remembering the last input and column selection.
    #[arg(long, default_value = C_FILE_PREFS_DEFAULT, global = true)]
    prefs: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the columns of a table with their distinct-value counts.
    Columns {
        /// Input spreadsheet (defaults to the last used file).
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Split a table by one or more columns.
    Split {
        /// Input spreadsheet (defaults to the last used file).
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Comma-separated columns to split by (defaults to the last selection).
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Output root (defaults to `<input dir>/<input stem>_split`).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Handling of values whose file names collide after sanitizing.
        #[arg(long, value_enum, default_value_t = CollisionArg::Disambiguate)]
        collision: CollisionArg,

        /// Print events as JSON lines instead of text.
        #[arg(long)]
        json_events: bool,

        /// Delay between event polls, in milliseconds.
        #[arg(long, default_value_t = 100)]
        poll_interval_ms: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CollisionArg {
    /// Suffix later names with `__2`, `__3`, ...
    Disambiguate,
    /// Let later files replace earlier ones.
    Overwrite,
}

impl From<CollisionArg> for EnumNameCollisionStrategy {
    fn from(value: CollisionArg) -> Self {
        match value {
            CollisionArg::Disambiguate => Self::Disambiguate,
            CollisionArg::Overwrite => Self::Overwrite,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let mut store_prefs = StorePreferences::load(&args.prefs);

    match args.command {
        Command::Columns { input } => run_columns(&mut store_prefs, input),
        Command::Split {
            input,
            columns,
            output,
            collision,
            json_events,
            poll_interval_ms,
        } => {
            let rule_format = if json_events {
                EnumEventFormat::Json
            } else {
                EnumEventFormat::Human
            };
            run_split(
                &mut store_prefs,
                SpecSplitArgs {
                    input,
                    columns,
                    output,
                    options: SpecSplitOptions {
                        rule_name_collision: collision.into(),
                    },
                    rule_format,
                    interval_poll: Duration::from_millis(poll_interval_ms),
                },
            )
        }
    }
}

/// Resolved arguments of the `split` command.
struct SpecSplitArgs {
    input: Option<PathBuf>,
    columns: Vec<String>,
    output: Option<PathBuf>,
    options: SpecSplitOptions,
    rule_format: EnumEventFormat,
    interval_poll: Duration,
}

fn run_columns(
    store_prefs: &mut StorePreferences,
    input: Option<PathBuf>,
) -> anyhow::Result<()> {
    let path_file_in = resolve_input(store_prefs, input)?;
    let mut session = SplitSession::default();
    load_session_table(&mut session, store_prefs, &path_file_in)?;

    for c_name in session.columns() {
        let plan = session
            .build_plan(&[c_name.as_str()])
            .with_context(|| format!("Failed to inspect column {c_name:?}"))?;
        println!("{c_name}\t{}", plan.cnt_units_total);
    }
    Ok(())
}

fn run_split(store_prefs: &mut StorePreferences, args: SpecSplitArgs) -> anyhow::Result<()> {
    let path_file_in = resolve_input(store_prefs, args.input)?;
    let l_columns = if args.columns.is_empty() {
        store_prefs.get().last_selected_columns.clone()
    } else {
        args.columns
    };
    let path_dir_out = args
        .output
        .unwrap_or_else(|| derive_default_output_dir(&path_file_in));

    let mut session = SplitSession::new(args.options);
    load_session_table(&mut session, store_prefs, &path_file_in)?;

    let job = match session.start_job(&l_columns, &path_dir_out) {
        Ok(job) => job,
        Err(SplitSessionError::NothingToSplit) => {
            println!("Nothing to split: the selected columns have no values.");
            return Ok(());
        }
        Err(err) => return Err(err).context("Failed to start split"),
    };
    if let Err(err) = spawn_interrupt_listener(job.token().clone()) {
        warn!("Ctrl-C will not cancel the split: {err:#}");
    }
    store_prefs.record_selected_columns(&l_columns);
    store_prefs.save_or_warn();

    info!(
        input = %path_file_in.display(),
        output = %path_dir_out.display(),
        units = job.cnt_units_total(),
        "split started"
    );
    let report = consume_job(
        job,
        args.rule_format,
        args.interval_poll,
        &mut io::stdout().lock(),
    )?;
    info!("{report}");
    derive_exit_result(&report)
}

/// A failed job is an error; a cancelled one exits cleanly.
fn derive_exit_result(report: &ReportSplit) -> anyhow::Result<()> {
    if let Some(message) = &report.failure {
        bail!("Split failed: {message}");
    }
    if report.if_cancelled {
        println!(
            "Split cancelled after {}/{} files.",
            report.cnt_units_completed, report.cnt_units_total
        );
    }
    Ok(())
}

fn resolve_input(
    store_prefs: &StorePreferences,
    input: Option<PathBuf>,
) -> anyhow::Result<PathBuf> {
    input
        .or_else(|| store_prefs.get().last_used_file.clone())
        .context("No input file given and no previously used file remembered")
}

fn load_session_table(
    session: &mut SplitSession,
    store_prefs: &mut StorePreferences,
    path_file_in: &Path,
) -> anyhow::Result<()> {
    session.load_table(path_file_in)?;
    store_prefs.record_loaded_file(path_file_in);
    store_prefs.save_or_warn();
    Ok(())
}

/// `<input dir>/<input stem>_split`.
fn derive_default_output_dir(path_file_in: &Path) -> PathBuf {
    let c_stem = path_file_in
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let path_dir_parent = path_file_in.parent().unwrap_or_else(|| Path::new(""));
    path_dir_parent.join(format!("{c_stem}{C_SUFFIX_OUTPUT_DIR}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_dir_next_to_input() {
        assert_eq!(
            derive_default_output_dir(Path::new("/data/sales.xlsx")),
            PathBuf::from("/data/sales_split")
        );
        assert_eq!(
            derive_default_output_dir(Path::new("sales.xlsx")),
            PathBuf::from("sales_split")
        );
    }

    #[test]
    fn test_split_args_parse_column_list() {
        let args = Args::try_parse_from([
            "colsplit",
            "split",
            "--input",
            "in.xlsx",
            "--columns",
            "Region,Year",
            "--collision",
            "overwrite",
        ])
        .expect("parse");

        let Command::Split {
            columns, collision, ..
        } = args.command
        else {
            panic!("expected split command");
        };
        assert_eq!(columns, vec!["Region", "Year"]);
        assert_eq!(collision, CollisionArg::Overwrite);
        assert_eq!(args.prefs, PathBuf::from(C_FILE_PREFS_DEFAULT));
    }

    #[test]
    fn test_exit_result_cancelled_is_ok_failed_is_err() {
        use colsplit_split::{EnumProgressEvent, ReportSplitBuilder};

        let mut builder = ReportSplitBuilder::new(3);
        builder.observe(&EnumProgressEvent::Finished { cancelled: true });
        let report = builder.build();
        assert!(report.if_cancelled);
        assert!(derive_exit_result(&report).is_ok());

        let mut builder = ReportSplitBuilder::new(3);
        builder.observe(&EnumProgressEvent::Failed {
            message: "disk full".to_string(),
        });
        let err = derive_exit_result(&builder.build()).expect_err("failed job");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_args_definition_is_valid() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
