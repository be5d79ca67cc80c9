//! # Plantilla CLI
//!
//! Command-line interface for resolving and rendering form templates.
//!
//! ## Usage
//!
//! ```bash
//! # Print every resolved value
//! plantilla resolve template.json values.json
//!
//! # Check required fields, duplicate ids and formulas
//! plantilla validate template.json values.json
//!
//! # Render page 1 as PNG at 2 px/pt over a page raster
//! plantilla preview template.json values.json --page 1 --scale 2 --background page1.png -o page1.png
//!
//! # Export a filled PDF
//! plantilla export template.json values.json -o filled.pdf
//!
//! # Start the HTTP API
//! plantilla serve --listen 0.0.0.0:8080
//! ```
//!
//! Set `RUST_LOG=plantilla=debug` to trace reference resolution.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use plantilla::{
    PlantillaError, Resolver, Template, ValueMap,
    export::export_pdf,
    layout,
    preview::{DEFAULT_PREVIEW_SCALE, RenderOptions, render_page},
    server::{ServerConfig, serve},
};

/// Plantilla - PDF form template engine
#[derive(Parser, Debug)]
#[command(name = "plantilla")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve every field and formula and print the values
    Resolve {
        /// Template JSON file
        template: PathBuf,

        /// Values JSON file (omit for an empty value map)
        values: Option<PathBuf>,

        /// Print the full resolution as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a template against a value map
    Validate {
        template: PathBuf,
        values: Option<PathBuf>,
    },

    /// Render one page as PNG
    Preview {
        template: PathBuf,
        values: Option<PathBuf>,

        /// 1-based page number
        #[arg(long, default_value = "1")]
        page: u32,

        /// Pixels per point
        #[arg(long, default_value_t = DEFAULT_PREVIEW_SCALE)]
        scale: f32,

        /// Page raster drawn under the fields
        #[arg(long, value_name = "FILE")]
        background: Option<PathBuf>,

        /// Output PNG path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Export every page to PDF
    Export {
        template: PathBuf,
        values: Option<PathBuf>,

        /// Output PDF path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Start the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,

        /// Default preview pixels per point
        #[arg(long, default_value_t = DEFAULT_PREVIEW_SCALE)]
        preview_scale: f32,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plantilla=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), PlantillaError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            template,
            values,
            json,
        } => {
            let (template, values) = load(&template, values.as_deref())?;
            let resolution = Resolver::new(&template, &values).resolve();

            if json {
                println!("{}", serde_json::to_string_pretty(&resolution)?);
            } else {
                for (key, resolved) in resolution.iter() {
                    println!("{} = {}", key, resolved.text);
                }
            }

            let errors = resolution.errors();
            if !errors.is_empty() {
                info!(count = errors.len(), "some formulas did not resolve");
            }
        }

        Commands::Validate { template, values } => {
            let (template, values) = load(&template, values.as_deref())?;
            let issues = template.validate(&values);
            if issues.is_empty() {
                println!("ok: {} fields", template.fields.len());
            } else {
                for issue in &issues {
                    println!("{}: {:?}", issue.field, issue.kind);
                }
                return Err(PlantillaError::Template(format!(
                    "{} validation issue(s)",
                    issues.len()
                )));
            }
        }

        Commands::Preview {
            template,
            values,
            page,
            scale,
            background,
            output,
        } => {
            let (template, values) = load(&template, values.as_deref())?;
            let resolution = Resolver::new(&template, &values).resolve();
            let plan = layout::compile(&template, &resolution);

            let mut options = RenderOptions::default().with_scale(scale);
            if let Some(path) = background {
                options = options.with_background(std::fs::read(path)?);
            }

            let png = render_page(&plan, page, &options)?;
            std::fs::write(&output, png)?;
            println!("Saved page {} to {}", page, output.display());
        }

        Commands::Export {
            template,
            values,
            output,
        } => {
            let (template, values) = load(&template, values.as_deref())?;
            let resolution = Resolver::new(&template, &values).resolve();
            let plan = layout::compile(&template, &resolution);

            let pdf = export_pdf(&plan, &template.name)?;
            std::fs::write(&output, pdf)?;
            println!(
                "Saved {} page(s) to {}",
                plan.page_count(),
                output.display()
            );
        }

        Commands::Serve {
            listen,
            preview_scale,
        } => {
            let config = ServerConfig {
                listen_addr: listen,
                preview_scale,
                ..Default::default()
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(config))?;
        }
    }

    Ok(())
}

/// Read a template and an optional value map from disk.
fn load(template: &Path, values: Option<&Path>) -> Result<(Template, ValueMap), PlantillaError> {
    let template = Template::from_json(&std::fs::read_to_string(template)?)?;
    let values = match values {
        Some(path) => ValueMap::from_json(&std::fs::read_to_string(path)?)?,
        None => ValueMap::new(),
    };
    info!(
        template = %template.name,
        fields = template.fields.len(),
        values = values.len(),
        "loaded template"
    );
    Ok((template, values))
}
