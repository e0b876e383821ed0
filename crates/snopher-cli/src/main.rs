use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use snopher_config::{Config, ConfigLoader};
use std::path::PathBuf;

mod commands;
mod logging;

/// Call the snopher native library from the command line.
///
/// Each subcommand marshals its arguments across the C ABI, calls one
/// native function and prints the result.
///
/// EXAMPLES:
///     snopher add 10 15                  Add two integers natively
///     snopher squares 1 2 3              Square each value
///     snopher repeat Badger 4            Repeat a string
///     snopher even -5 --non-negative     Status-checked struct return
///     snopher describe --json            List every bound signature
///
/// ENVIRONMENT VARIABLES:
///     SNOPHER_LIBRARY          Path to the native shared library
///     SNOPHER_STRING_CAPACITY  Output buffer size for string results
///     SNOPHER_LOG              Log filter (error, warn, info, debug, trace)
#[derive(Parser)]
#[command(name = "snopher")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the native shared library
    #[arg(long, global = true, value_name = "PATH")]
    lib: Option<PathBuf>,

    /// Settings file to use instead of searching for snopher.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output buffer size for string results, in bytes
    #[arg(long, global = true, value_name = "BYTES")]
    string_capacity: Option<usize>,

    /// Log filter, overriding settings files and SNOPHER_LOG
    #[arg(long, global = true, value_name = "LEVEL")]
    log: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add two integers
    Add {
        #[arg(allow_negative_numbers = true)]
        a: i64,
        #[arg(allow_negative_numbers = true)]
        b: i64,
    },

    /// Square each value; the input is left untouched
    Squares {
        #[arg(allow_negative_numbers = true)]
        values: Vec<f64>,
    },

    /// Divide each value by the Euclidean norm
    Normalize {
        #[arg(allow_negative_numbers = true)]
        values: Vec<f64>,
    },

    /// Dot product over the shorter of two vectors
    ///
    /// EXAMPLES:
    ///     snopher dot --a 1,2,3 --b 4,5,6
    Dot {
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        a: Vec<f64>,
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        b: Vec<f64>,
    },

    /// Shuffle values in place (deterministic)
    Shuffle {
        #[arg(allow_negative_numbers = true)]
        values: Vec<f64>,
    },

    /// Add a delta to every element of an integer column in place
    ///
    /// The native function only accepts int64 columns. Other dtypes are
    /// refused unless --convert is given.
    ///
    /// EXAMPLES:
    ///     snopher increase --by 5 20 30 40
    ///     snopher increase --dtype int32 --convert 20 30 40
    Increase {
        #[arg(allow_negative_numbers = true)]
        values: Vec<i64>,
        /// Delta added to each element
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        by: i64,
        /// Element type of the column
        #[arg(long, value_enum, default_value_t = Dtype::Int64)]
        dtype: Dtype,
        /// Convert the column to int64 before the call
        #[arg(long)]
        convert: bool,
    },

    /// Repeat a string N times
    Repeat { text: String, count: i64 },

    /// Join words with a separator
    Join {
        words: Vec<String>,
        /// Separator placed between words
        #[arg(long, short = 's', default_value = " ")]
        sep: String,
    },

    /// Fill a person's full name through a struct pointer
    Fill { first: String, last: String },

    /// Report whether a number is even
    Even {
        #[arg(allow_negative_numbers = true)]
        value: i64,
        /// Use the status-checked variant that rejects negative input
        #[arg(long)]
        non_negative: bool,
    },

    /// Fetch native-allocated user records
    #[command(name = "user-info")]
    UserInfo {
        #[arg(required = true)]
        names: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Square roots of 1..=N, allocated through the host callback
    Sqrts {
        #[arg(allow_negative_numbers = true)]
        count: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Native-allocated sequence 0..N
    Iota {
        #[arg(allow_negative_numbers = true)]
        count: i64,
    },

    /// List every bound function with its signature
    Describe {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Dtype {
    Int64,
    Int32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    logging::init(config.log_level(), cli.verbose);
    tracing::debug!(
        project = ?config.project_root(),
        library = ?config.library_path(),
        string_capacity = config.string_capacity(),
        "configuration resolved"
    );

    let native = commands::connect(&config)?;

    match cli.command {
        Commands::Add { a, b } => commands::scalar::add(&native, a, b),
        Commands::Squares { values } => commands::elementwise::squares(&native, &values),
        Commands::Normalize { values } => commands::elementwise::normalize(&native, &values),
        Commands::Dot { a, b } => commands::elementwise::dot(&native, &a, &b),
        Commands::Shuffle { values } => commands::inplace::shuffle(&native, values),
        Commands::Increase {
            values,
            by,
            dtype,
            convert,
        } => commands::inplace::increase(&native, values, by, dtype, convert),
        Commands::Repeat { text, count } => commands::strings::repeat(&native, &text, count),
        Commands::Join { words, sep } => commands::strings::join(&native, &words, &sep),
        Commands::Fill { first, last } => commands::structs::fill(&native, &first, &last),
        Commands::Even {
            value,
            non_negative,
        } => commands::structs::even(&native, value, non_negative),
        Commands::UserInfo { names, json } => commands::structs::user_info(&native, &names, json),
        Commands::Sqrts { count, json } => commands::alloc::sqrts(&native, count, json),
        Commands::Iota { count } => commands::alloc::iota(&native, count),
        Commands::Describe { json } => commands::describe::run(&native, json),
    }
}

/// Settings file layers, then CLI flags on top
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut loader = ConfigLoader::new();
    let mut config = match &cli.config {
        Some(path) => loader
            .load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            loader
                .load_from_directory(&cwd)
                .context("Failed to load snopher.toml")?
        }
    };

    if let Some(lib) = &cli.lib {
        config.override_library(lib.clone());
    }
    if let Some(capacity) = cli.string_capacity {
        config.override_string_capacity(capacity)?;
    }
    if let Some(level) = &cli.log {
        config.override_log_level(level.as_str())?;
    }
    Ok(config)
}
