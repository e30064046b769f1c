//! huggingplace: log AI interactions and traces from the command line.

mod config;

use std::convert::Infallible;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use huggingplace::trace::{SpanOptions, generate_id};
use huggingplace::{HuggingPlace, LogOptions, Mode};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::{FileConfig, Overrides};

/// Log AI interactions and workflow traces to HuggingPlace
#[derive(Parser, Debug)]
#[command(name = "huggingplace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to .huggingplace directory or config file (default: search for .huggingplace/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API key
    #[arg(long, global = true, env = "HUGGINGPLACE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Organization ID
    #[arg(long, global = true, env = "HUGGINGPLACE_ORG_ID")]
    org_id: Option<String>,

    /// Environment mode: prod or dev
    #[arg(long, global = true, env = "HUGGINGPLACE_MODE")]
    mode: Option<Mode>,

    /// Custom API base URL
    #[arg(long, global = true, env = "HUGGINGPLACE_BASE_URL")]
    base_url: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long, global = true, env = "HUGGINGPLACE_TIMEOUT")]
    timeout: Option<u64>,

    /// Suppress SDK diagnostics
    #[arg(long, global = true, env = "HUGGINGPLACE_SILENT")]
    silent: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log an interaction given as JSON (use "-" to read stdin)
    Log {
        /// Interaction JSON, e.g. '{"user_prompt": "Hello", "response": "Hi there!"}'
        data: String,
    },

    /// Test the connection to the HuggingPlace API
    Test,

    /// Emit one trace record for an operation and flush it
    Trace {
        /// Operation (step) name
        operation: String,

        /// Trace id to record under (generated when omitted)
        #[arg(long)]
        trace_id: Option<String>,

        /// Tags for the record
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            api_key: self.api_key.clone(),
            org_id: self.org_id.clone(),
            base_url: self.base_url.clone(),
            mode: self.mode,
            timeout: self.timeout,
            silent: self.silent,
        }
    }
}

/// Initialize logging to stderr for interactive use.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Parse interaction JSON from the argument, or from `stdin` when it is "-".
fn read_log_options(data: &str, mut stdin: impl Read) -> Result<LogOptions> {
    let raw = if data == "-" {
        let mut buf = String::new();
        stdin
            .read_to_string(&mut buf)
            .context("Failed to read JSON from stdin")?;
        buf
    } else {
        data.to_string()
    };
    serde_json::from_str(&raw).context("Invalid JSON")
}

async fn run_log(client: &HuggingPlace, options: LogOptions) -> Result<()> {
    client
        .log(options)
        .await
        .context("Failed to log interaction")?;
    println!("Interaction logged successfully");
    Ok(())
}

async fn run_test(client: &HuggingPlace) -> Result<()> {
    if !client.test_connection().await {
        bail!("Connection failed");
    }
    println!("Connection successful");
    Ok(())
}

async fn run_trace(
    client: &HuggingPlace,
    operation: String,
    trace_id: Option<String>,
    tags: Vec<String>,
) -> Result<()> {
    let trace_id = trace_id.unwrap_or_else(generate_id);
    let options = SpanOptions::new()
        .with_trace_id(trace_id.clone())
        .with_tags(tags)
        .with_custom_metadata("source", "cli");

    let _ = client
        .tracer()
        .trace_step(&operation, options, async {
            Ok::<_, Infallible>(json!({ "operation": operation }))
        })
        .await;
    client.shutdown().await;

    println!("Trace recorded: {}", trace_id);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let file = FileConfig::load(cli.config.as_deref())?;
    let config = file.resolve(cli.overrides())?;

    // JSON is checked before any client is built.
    let log_options = match &cli.command {
        Commands::Log { data } => Some(read_log_options(data, std::io::stdin())?),
        _ => None,
    };

    let client = HuggingPlace::new(config).context("Invalid configuration")?;

    match cli.command {
        Commands::Log { .. } => {
            if let Some(options) = log_options {
                run_log(&client, options).await?;
            }
        }
        Commands::Test => run_test(&client).await?,
        Commands::Trace {
            operation,
            trace_id,
            tags,
        } => run_trace(&client, operation, trace_id, tags).await?,
    }

    client.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_command() {
        let cli = Cli::try_parse_from([
            "huggingplace",
            "--verbose",
            "--org-id",
            "org-1",
            "log",
            r#"{"user_prompt": "hi"}"#,
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.org_id.as_deref(), Some("org-1"));
        assert!(matches!(cli.command, Commands::Log { .. }));
    }

    #[test]
    fn test_parse_trace_command() {
        let cli = Cli::try_parse_from([
            "huggingplace",
            "trace",
            "embed",
            "--tag",
            "a",
            "--tag",
            "b",
            "--mode",
            "dev",
        ])
        .unwrap();
        assert_eq!(cli.mode, Some(Mode::Dev));
        match cli.command {
            Commands::Trace {
                operation, tags, ..
            } => {
                assert_eq!(operation, "embed");
                assert_eq!(tags, vec!["a", "b"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert!(Cli::try_parse_from(["huggingplace", "--mode", "staging", "test"]).is_err());
    }

    #[test]
    fn test_read_log_options_from_argument() {
        let options =
            read_log_options(r#"{"user_prompt": "Hello", "response": "Hi"}"#, std::io::empty())
                .unwrap();
        assert_eq!(options.user_prompt.as_deref(), Some("Hello"));
        assert_eq!(options.response.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_read_log_options_from_stdin() {
        let stdin = std::io::Cursor::new(r#"{"user_prompt": "piped"}"#);
        let options = read_log_options("-", stdin).unwrap();
        assert_eq!(options.user_prompt.as_deref(), Some("piped"));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = read_log_options("{not json", std::io::empty()).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }
}
