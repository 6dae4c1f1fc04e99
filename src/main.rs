use clap::{Parser, Subcommand};
use siteforge::site::Site;
use siteforge::{config, output};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "siteforge")]
#[command(about = "Incremental static site build engine")]
#[command(long_about = "\
Incremental static site build engine

Files that open with a front matter fence (--- YAML or +++ TOML) are pages;
everything else is a static file copied as-is. Markdown pages are converted
to HTML, and pages get folder-style URLs.

Content structure:

  content/
  ├── config.toml          # Site config (optional)
  ├── .siteforge/          # Reserved, never published
  ├── index.md             # Page → /index.html
  ├── about.md             # Page → /about/index.html
  ├── blog/
  │   ├── index.md         # Page → /blog/index.html
  │   └── post.md          # Page → /blog/post/index.html
  └── css/site.css         # Static → /css/site.css

Ordering: pages are ordered by weight (directory listing order unless front
matter sets `weight`), then by date.

Rebuilding an unchanged tree rewrites nothing. Outputs no longer produced
are removed after a clean build.

Run 'siteforge gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Content directory
    #[arg(long, default_value = "content", global = true)]
    source: PathBuf,

    /// Output directory
    #[arg(long, default_value = "dist", global = true)]
    output: PathBuf,

    /// Log debug events (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site into the output directory
    Build,
    /// Load and index the content without writing anything
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Build => {
            println!("==> Building {} → {}", cli.source.display(), cli.output.display());
            let mut site = Site::open(&cli.source, &cli.output)?;
            let report = site.build()?;
            output::print_build_report(&report);
            if report.has_errors {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Check => {
            println!("==> Checking {}", cli.source.display());
            let mut site = Site::open(&cli.source, &cli.output)?;
            let report = site.check()?;
            output::print_content_output(site.content());
            if report.has_errors {
                println!("==> Content has errors");
                return Ok(ExitCode::FAILURE);
            }
            println!("==> Content is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Install the `tracing` subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "siteforge=debug" } else { "siteforge=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}
