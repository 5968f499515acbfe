use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use pagelist_core::config::{PagelistConfig, load_config};
use pagelist_core::directive::{DirectiveOutcome, parse_directive, tokenize};
use pagelist_core::host::{Collaborators, TracingDiagnostics};
use pagelist_core::priority::sort_by_priority;
use pagelist_core::processor::ParameterProcessor;
use pagelist_core::query::ParamValue;
use pagelist_core::registry::{Dispatch, ParameterDescriptor, ParameterRegistry};
use pagelist_core::site::StaticSite;
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "pagelist.toml";

#[derive(Debug, Parser)]
#[command(
    name = "pagelist",
    version,
    about = "Validate and normalize page-list directives"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Engine and site config (TOML)")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Log parameter decisions to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Parse a directive and print the resulting query specification")]
    Parse(ParseArgs),
    #[command(about = "List registered parameters")]
    Params(ParamsArgs),
    #[command(about = "Print directive pairs in processing order")]
    Sort(InputArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Args)]
struct InputArgs {
    #[arg(value_name = "FILE", help = "Directive file; stdin when omitted or `-`")]
    input: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ParseArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct ParamsArgs {
    #[arg(long, value_name = "LEVEL", help = "Only parameters available at this richness")]
    richness: Option<u8>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Some(Commands::Parse(args)) => run_parse(cli.config.as_deref(), args),
        Some(Commands::Params(args)) => run_params(cli.config.as_deref(), args),
        Some(Commands::Sort(args)) => run_sort(args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "pagelist={default_level},pagelist_core={default_level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_runtime_config(path: Option<&Path>) -> Result<PagelistConfig> {
    let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
    let mut config = load_config(path)?;
    config.engine.apply_env_overrides()?;
    debug!(path = %path.display(), richness = config.engine.functional_richness, "loaded config");
    Ok(config)
}

fn read_input(input: &InputArgs) -> Result<String> {
    match input.input.as_deref() {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read directive from stdin")?;
            Ok(text)
        }
    }
}

fn run_parse(config_path: Option<&Path>, args: ParseArgs) -> Result<()> {
    let config = load_runtime_config(config_path)?;
    let text = read_input(&args.input)?;
    let registry = ParameterRegistry::standard()?;
    let site = StaticSite::new(&config.site);
    let diagnostics = TracingDiagnostics;
    let host = Collaborators::uniform(&site).with_diagnostics(&diagnostics);
    let processor = ParameterProcessor::new(registry, &config.engine, host);

    let outcome = parse_directive(&text, &processor)?;
    match args.format {
        OutputFormat::Json => print_outcome_json(&outcome)?,
        OutputFormat::Text => print_outcome_text(&outcome),
    }
    Ok(())
}

fn print_outcome_json(outcome: &DirectiveOutcome) -> Result<()> {
    let report = json!({
        "fingerprint": outcome.fingerprint,
        "warnings": outcome
            .warnings
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        "specification": outcome.spec,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_outcome_text(outcome: &DirectiveOutcome) {
    let spec = &outcome.spec;
    println!("fingerprint: {}", outcome.fingerprint);
    println!(
        "selection_criteria_found: {}",
        format_flag(spec.is_selection_criteria_found())
    );
    println!(
        "open_references_conflict: {}",
        format_flag(spec.is_open_references_conflict())
    );
    for (name, value) in spec.all_values() {
        let marker = if spec.was_specified(name) { "*" } else { " " };
        println!("{marker} {name}: {}", format_value(value));
    }
    for warning in &outcome.warnings {
        println!("warning: {warning}");
    }
}

fn format_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Text(text) => format!("{text:?}"),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}

fn run_params(config_path: Option<&Path>, args: ParamsArgs) -> Result<()> {
    let config = load_runtime_config(config_path)?;
    let richness = args.richness.unwrap_or(config.engine.functional_richness);
    let registry = ParameterRegistry::standard()?;
    let mut descriptors: Vec<&ParameterDescriptor> = registry
        .descriptors()
        .filter(|descriptor| descriptor.richness <= richness)
        .collect();
    descriptors.sort_by_key(|descriptor| descriptor.name);

    println!("parameters available at richness {richness}: {}", descriptors.len());
    for descriptor in descriptors {
        println!(
            "{:<24} level={} {}",
            descriptor.name,
            descriptor.richness,
            describe_dispatch(descriptor)
        );
    }
    Ok(())
}

fn describe_dispatch(descriptor: &ParameterDescriptor) -> String {
    let mut traits = Vec::new();
    match descriptor.dispatch {
        Dispatch::Custom(handler) => traits.push(format!("handler={handler:?}")),
        Dispatch::Pipeline => traits.push("pipeline".to_string()),
    }
    if let Some(values) = descriptor.values {
        traits.push(format!("values={}", values.join("|")));
    }
    if let Some(capability) = descriptor.permission {
        traits.push(format!("requires={capability}"));
    }
    traits.join(" ")
}

fn run_sort(args: InputArgs) -> Result<()> {
    let text = read_input(&args)?;
    for (name, value) in sort_by_priority(tokenize(&text))? {
        println!("{name}={value}");
    }
    Ok(())
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
