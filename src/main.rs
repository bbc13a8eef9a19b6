//! Cyclegen CLI Entry Point
//!
//! Provides the command-line interface for workflow compilation.
//!
//! # Usage
//!
//! ```bash
//! # Compile a configuration and print the XML
//! cyclegen workflow.yml
//!
//! # Write the XML to a file
//! cyclegen workflow.yml -o workflow.xml
//!
//! # Preview without writing the output file
//! cyclegen workflow.yml -o workflow.xml --dry-run
//!
//! # Enable debug logging
//! cyclegen workflow.yml --verbose
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use log::{error, info};

use cyclegen::config::loader::load_config;
use cyclegen::config::templates::TemplateResolver;
use cyclegen::error::Error;
use cyclegen::workflow::assembler::compile;
use cyclegen::{APP_NAME, VERSION};

/// Default configuration file used when none is specified.
const DEFAULT_CONFIG: &str = "workflow.yml";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    config_path: String,
    out_path: Option<PathBuf>,
    dry_run: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_CONFIG.to_string(),
            out_path: None,
            dry_run: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: cyclegen [OPTIONS] <CONFIG_FILE>");
    println!();
    println!("Arguments:");
    println!("  <CONFIG_FILE>       Path to workflow configuration YAML file");
    println!();
    println!("Options:");
    println!("  -o, --output PATH   Write the workflow XML to PATH");
    println!("  --dry-run           Print the rendered XML instead of writing it");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  cyclegen workflow.yml");
    println!("  cyclegen workflow.yml -o workflow.xml");
    println!("  cyclegen workflow.yml -o workflow.xml --dry-run");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--output" | "-o" => {
                i += 1;
                if i >= args.len() {
                    return Err("--output requires a path argument".to_string());
                }
                config.out_path = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                // Positional argument
                match positional_index {
                    0 => config.config_path = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Checks that the output path can be written: its parent directory must
/// exist and not be read-only.
fn check_output_path(path: &Path) -> Result<(), Error> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if !parent.is_dir() {
        return Err(Error::UnwritablePath(path.to_path_buf()));
    }

    let readonly = fs::metadata(&parent)
        .map(|meta| meta.permissions().readonly())
        .unwrap_or(true);
    if readonly {
        return Err(Error::UnwritablePath(path.to_path_buf()));
    }

    Ok(())
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    if config.dry_run {
        info!("Mode: DRY RUN (output file will not be written)");
    }

    // The output destination must be writable before any work happens
    if let Some(ref out_path) = config.out_path {
        check_output_path(out_path)?;
    }

    // Load configuration
    info!("Loading configuration: {}", config.config_path);
    let mut workflow_config = load_config(&config.config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        format!(
            "Could not load configuration from '{}': {}",
            config.config_path, e
        )
    })?;

    // Compile to a workflow document
    let resolver = TemplateResolver::from_env();
    let document = compile(&mut workflow_config, &resolver)?;

    // Print or write the result
    match config.out_path {
        Some(out_path) if !config.dry_run => {
            document.write_to(&out_path)?;
            info!("Workflow written to: {}", out_path.display());
        }
        _ => print!("{}", document.render()),
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
