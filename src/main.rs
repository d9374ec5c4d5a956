use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ldmap::report::{write_report, ReportOptions};
use ldmap::{
    resolve_map_file, MapError, MapResult, MemoryUsage, OrphanModulePolicy, ParseOptions,
    ProviderConfig, ProviderRegistry, SupportCache,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Map file written by ld, or a directory holding map.txt
    filename: PathBuf,

    /// Usage bar width
    #[arg(short, long, default_value = "32")]
    width: usize,

    /// List object file contributions per section
    #[arg(short, long)]
    modules: bool,

    /// Hide regions without allocated sections
    #[arg(short = 'e', long)]
    hide_empty: bool,

    #[arg(long)]
    no_color: bool,

    /// Fail on module lines that precede every section
    #[arg(long)]
    strict: bool,

    /// Treat sections starting with PREFIX as not allocated
    #[arg(short = 'x', long = "exclude", value_name = "PREFIX")]
    exclude: Vec<String>,

    /// Check that <TARGET>-ld can write map files before parsing
    #[arg(long)]
    target: Option<String>,

    #[arg(long, default_value = "default")]
    build_mode: String,

    #[arg(long, default_value = "LD")]
    provider: String,
}

fn fetch(args: &Args) -> MapResult<MemoryUsage> {
    let mut options = ParseOptions::default();
    for prefix in &args.exclude {
        options = options.with_excluded_prefix(prefix);
    }
    if args.strict {
        options = options.with_orphan_policy(OrphanModulePolicy::Fail);
    }

    let config = ProviderConfig {
        target: args.target.clone().unwrap_or_default(),
        build_mode: args.build_mode.clone(),
        map_file: resolve_map_file(&args.filename),
        options,
    };
    let provider = ProviderRegistry::with_defaults().create(&args.provider, &config)?;

    if args.target.is_some() && !provider.is_enabled(&mut SupportCache::new()) {
        return Err(MapError::Unsupported {
            target: config.target,
            build_mode: config.build_mode,
        });
    }

    let mut usage = MemoryUsage::default();
    provider.fetch(&mut usage)?;
    Ok(usage)
}

fn report_error(err: &dyn Error) {
    eprintln!("error: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let usage = match fetch(&args) {
        Ok(usage) => usage,
        Err(err) => {
            report_error(&err);
            return ExitCode::FAILURE;
        }
    };

    let options = ReportOptions {
        width: args.width,
        modules: args.modules,
        hide_empty: args.hide_empty,
        color: !args.no_color,
    };
    if let Err(err) = write_report(&mut io::stdout().lock(), &usage, &options) {
        report_error(&err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
