//! docql - evaluate a JSON-encoded expression tree against a JSON document

use anyhow::{bail, Context as _, Result};
use clap::Parser as ClapParser;
use docql::config::EvalConfig;
use docql::context::MemoryContext;
use docql::expression::{AnnotatedValue, Expression, Folder};
use docql::value::Value;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// docql - evaluate document query expressions
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Expression tree as JSON
    #[arg(short, long)]
    expr: PathBuf,

    /// Document to evaluate against (defaults to an empty object)
    #[arg(short = 'D', long)]
    doc: Option<PathBuf>,

    /// Print the folded expression instead of evaluating it
    #[arg(short, long)]
    fold: bool,

    /// Named parameter as name=json, repeatable
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, Value)>,

    /// Evaluation limits as JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the maximum array size
    #[arg(long)]
    max_array_size: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn parse_param(arg: &str) -> Result<(String, Value)> {
    let Some((name, json)) = arg.split_once('=') else {
        bail!("expected name=json, got {}", arg);
    };
    let value: serde_json::Value =
        serde_json::from_str(json).with_context(|| format!("Invalid JSON for parameter {}", name))?;
    Ok((name.trim_start_matches('$').to_string(), Value::from(value)))
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut config = match &args.config {
        Some(path) => EvalConfig::from_file(path)?,
        None => EvalConfig::default(),
    };
    if let Some(max) = args.max_array_size {
        config = config.with_max_array_size(max);
    }
    debug!("evaluation config: {:?}", config);

    let expr: Expression = serde_json::from_value(read_json(&args.expr)?)
        .context("Failed to decode expression tree")?;

    if args.fold {
        let folded = Folder::new(config).fold(&expr)?;
        println!("{}", serde_json::to_string_pretty(&folded)?);
        return Ok(());
    }

    let doc = match &args.doc {
        Some(path) => Value::from(read_json(path)?),
        None => Value::empty_object(),
    };

    let mut context = MemoryContext::new(config);
    for (name, value) in args.params {
        context = context.with_named_parameter(name, value);
    }

    let result = expr
        .evaluate(&AnnotatedValue::new(doc), &context)
        .context("Evaluation failed")?;
    for warning in context.take_warnings() {
        warn!("{}", warning);
    }
    info!("result type: {}", result.value_type().name());

    if result.is_missing() {
        println!("MISSING");
    } else {
        println!("{}", serde_json::to_string_pretty(&result.to_json())?);
    }
    Ok(())
}
