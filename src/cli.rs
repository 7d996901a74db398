//! Command-line interface for gpt-analyzer.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analyzers::{self, AnalyzerOutput};
use crate::client::{ChatClient, ChatRequest, ClientError};
use crate::config::{self, Config};
use crate::prompt;
use crate::report;
use crate::strip::CommentStripper;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Ask a language model to review a C source file.
///
/// The file is stripped of comments, optionally combined with the output
/// of external static analyzers, and sent to a chat-completion endpoint.
/// The model's answer is printed to stdout.
#[derive(Parser)]
#[command(name = "gpt-analyzer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a source file to the model for review
    #[command(visible_alias = "check")]
    Analyze(AnalyzeArgs),
    /// Print a source file with comments removed
    Strip(StripArgs),
    /// Write a configuration file with the default settings
    Init(InitArgs),
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    /// Source file to analyze
    pub file: PathBuf,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model name (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// File holding the API key (overrides config)
    #[arg(long)]
    pub api_key_file: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Do not run external analyzers
    #[arg(long)]
    pub no_analyzers: bool,

    /// Print the request body instead of sending it
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the strip command.
#[derive(Parser)]
pub struct StripArgs {
    /// Source file to strip
    pub file: PathBuf,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Where to write the config file
    #[arg(short, long, default_value = "gpt-analyzer.yaml")]
    pub output: PathBuf,

    /// Include the cppcheck, flawfinder and gcc analyzer presets
    #[arg(long)]
    pub analyzers: bool,

    /// Print the config to stdout instead of writing a file
    #[arg(long, conflicts_with = "force")]
    pub stdout: bool,

    /// Replace an existing file
    #[arg(long)]
    pub force: bool,
}

const CONFIG_HEADER: &str = "\
# gpt-analyzer configuration
#
# Analyzer commands run through `sh -c`. Placeholders are shell-quoted:
#   {file}  the analyzed file   {dir}  its directory   {stem}  name without extension
# The first line of api_key_file is the bearer token; OPENAI_API_KEY is used
# when that file does not exist.

";

/// Initialise `env_logger` on stderr.
///
/// `RUST_LOG` is honoured; `--verbose` forces debug output for this crate.
pub fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_module("gpt_analyzer", log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

/// Read a source file and strip its comments.
///
/// Unterminated constructs are logged but never rejected.
fn read_stripped(path: &Path) -> anyhow::Result<Vec<u8>> {
    let source = std::fs::read(path)?;
    let stripped = CommentStripper::new().strip(&source);

    if stripped.end_state.is_unterminated() {
        log::warn!(
            "{}: input ends inside an unterminated {}; trailing content may be dropped",
            path.display(),
            stripped.end_state
        );
    }
    log::debug!(
        "{}: stripped {} of {} bytes",
        path.display(),
        source.len() - stripped.text.len(),
        source.len()
    );

    Ok(stripped.text)
}

/// Exit code for a failed completion.
///
/// Answers the API refused or could not give are analysis failures; anything
/// that kept the exchange from completing is an error.
pub fn exit_code_for(err: &ClientError) -> i32 {
    match err {
        ClientError::UnexpectedResponse | ClientError::Api { .. } => EXIT_FAILED,
        ClientError::Network(_)
        | ClientError::Timeout
        | ClientError::Sink(_)
        | ClientError::Decode(_) => EXIT_ERROR,
    }
}

/// Run the analyze command, writing results to stdout.
pub fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    analyze_to(args, &mut out)
}

/// Run the analyze command, writing results to `out`.
pub fn analyze_to<W: Write>(args: &AnalyzeArgs, out: &mut W) -> anyhow::Result<i32> {
    // Validate format
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    // Load config
    let (mut config, config_path) = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(key_file) = &args.api_key_file {
        config.api_key_file = key_file.clone();
    }

    if let Err(e) = config::validate(&config) {
        eprintln!("Error: {}", e);
        if let Some(p) = config_path {
            eprintln!("Check {}", p.display());
        }
        return Ok(EXIT_ERROR);
    }

    // Read and strip source
    let source = match read_stripped(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading source file {}: {}", args.file.display(), e);
            return Ok(EXIT_ERROR);
        }
    };

    // Run analyzers
    let reports: Vec<AnalyzerOutput> = if args.no_analyzers {
        Vec::new()
    } else {
        let specs = match config.analyzers_for(&args.file) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(EXIT_ERROR);
            }
        };
        match analyzers::run_all(&specs, &args.file, config.max_analyzer_output_bytes) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    };

    // Assemble prompt
    let prompt_text = prompt::build_prompt(&config.question, &source, &reports);
    if let Err(e) = prompt::check_size(&prompt_text, config.max_prompt_bytes) {
        eprintln!("Error: {}", e);
        return Ok(EXIT_ERROR);
    }

    if args.dry_run {
        let request = ChatRequest::new(&config.model, &prompt_text);
        serde_json::to_writer_pretty(&mut *out, &request)?;
        writeln!(out)?;
        return Ok(EXIT_SUCCESS);
    }

    let api_key = match config::read_api_key(&config.api_key_file) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let client = ChatClient::new(&config, api_key)?;

    let spinner = (args.format == "pretty").then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
            pb.set_style(style);
        }
        pb.set_message(format!("Waiting for {}", client.model()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(client.complete(&prompt_text));

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let completion = match result {
        Ok(c) => c,
        Err(e) => {
            if matches!(e, ClientError::UnexpectedResponse) {
                report::write_unexpected(out)?;
            } else {
                eprintln!("Error: {}", e);
            }
            return Ok(exit_code_for(&e));
        }
    };

    if let Some(usage) = completion.usage {
        log::info!(
            "tokens: {} prompt, {} completion",
            usage.prompt_tokens,
            usage.completion_tokens
        );
    }

    let file_str = args.file.to_string_lossy().to_string();
    match args.format.as_str() {
        "json" => report::write_json(out, &file_str, &config.model, &reports, &completion)?,
        _ => report::write_pretty(out, &completion)?,
    }

    Ok(EXIT_SUCCESS)
}

/// Run the strip command.
pub fn run_strip(args: &StripArgs) -> anyhow::Result<i32> {
    let stripped = match read_stripped(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading source file {}: {}", args.file.display(), e);
            return Ok(EXIT_ERROR);
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    out.write_all(&stripped)?;
    out.flush()?;

    Ok(EXIT_SUCCESS)
}

/// Render a config file: the built-in defaults, plus the analyzer presets
/// when `with_analyzers` is set.
pub fn render_config(with_analyzers: bool) -> anyhow::Result<String> {
    let mut config = Config::default();
    if with_analyzers {
        config.analyzers = analyzers::presets();
    }
    config::validate(&config)?;

    let yaml = serde_yaml::to_string(&config)?;
    Ok(format!("{}{}", CONFIG_HEADER, yaml))
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    let rendered = render_config(args.analyzers)?;

    if args.stdout {
        print!("{}", rendered);
        return Ok(EXIT_SUCCESS);
    }

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true);
    if args.force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = match options.open(&args.output) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            eprintln!(
                "Error: {} already exists (pass --force to replace it)",
                args.output.display()
            );
            return Ok(EXIT_ERROR);
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(rendered.as_bytes())?;

    let analyzer_note = if args.analyzers {
        " with cppcheck, flawfinder and gcc analyzers"
    } else {
        ""
    };
    println!("Wrote {}{}", args.output.display(), analyzer_note);
    println!(
        "Analyze a file with: gpt-analyzer analyze <file.c> --config {}",
        args.output.display()
    );

    Ok(EXIT_SUCCESS)
}
