//! Command-line interface implementation

use clap::{Parser, Subcommand};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::compose;
use crate::registry::TextureRegistry;

/// Exit codes
const EXIT_SUCCESS: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_INVALID_ARGS: u8 = 2;

/// Default base URL used for env-object image references.
const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// bmap - Render tabletop battlemap payloads to SVG
#[derive(Parser)]
#[command(name = "bmap")]
#[command(about = "bmap - Render tabletop battlemap payloads to SVG")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a battlemap data payload to an SVG document
    Render {
        /// The encoded payload: a base64 `data` parameter value, a path to
        /// a file containing one, or `-` to read it from stdin
        data: String,

        /// Output file. If omitted, the SVG is written to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base URL prepended to environment object image references
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,
    },

    /// List the registered background textures as JSON
    Textures,

    /// Serve the battlemap image API over HTTP
    #[cfg(feature = "server")]
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,

        /// Base URL prepended to environment object image references
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,
    },
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            data,
            output,
            base_url,
        } => run_render(&data, output.as_deref(), &base_url),
        Commands::Textures => run_textures(),
        #[cfg(feature = "server")]
        Commands::Serve { addr, base_url } => run_serve(&addr, &base_url),
    }
}

/// Execute the render command
fn run_render(data: &str, output: Option<&Path>, base_url: &str) -> ExitCode {
    let payload = match read_payload(data) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: Cannot read payload '{data}': {e}");
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    let registry = TextureRegistry::from_embedded_assets();
    let svg = compose::render_data_param(payload.trim(), &registry, base_url);

    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, &svg) {
                eprintln!("Error: Cannot write output '{}': {}", path.display(), e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
        None => println!("{svg}"),
    }
    ExitCode::from(EXIT_SUCCESS)
}

/// Resolve the data argument: stdin marker, payload file, or literal value.
fn read_payload(data: &str) -> std::io::Result<String> {
    if data == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    let path = Path::new(data);
    if path.is_file() {
        return fs::read_to_string(path);
    }
    Ok(data.to_string())
}

/// Execute the textures command
fn run_textures() -> ExitCode {
    let registry = TextureRegistry::from_embedded_assets();
    match serde_json::to_string_pretty(registry.all_textures()) {
        Ok(json) => {
            println!("{json}");
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Execute the serve command
#[cfg(feature = "server")]
fn run_serve(addr: &str, base_url: &str) -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Cannot start runtime: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match runtime.block_on(crate::server::serve(addr, base_url)) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
