//! DSL Command Line Interface
//!
//! Dispatches commands to registered plugins, runs piped command lines,
//! and inspects schemas, tokens and plugins.
//!
//! # Usage
//!
//! ```bash
//! # Parse with the calc plugin
//! dsl_cli dispatch calc add "add 3 4"
//!
//! # Run a piped line against the configured schema
//! dsl_cli run 'calc sum add 1 2 | calc sum add ${_result} 10'
//!
//! # Show the tokens a plugin produces
//! echo '{"a": 1}' | dsl_cli tokenize json
//!
//! # Validate the configured schema
//! dsl_cli validate --schema config/schema.yaml
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use dsl_plugins::{
    error::format_validation_errors, grammar::unreachable_rules, validate, ConfigLoader, CstChild,
    CstNode, PluginRegistry, ResolverCatalog, ResolverOutput, SchemaDocument, Session,
};

#[derive(Parser)]
#[command(name = "dsl_cli")]
#[command(version = "0.1.0")]
#[command(about = "Dispatch commands to DSL plugins and inspect schemas, tokens and grammars")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: json or pretty (default)
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,

    /// Config directory holding schema.yaml and plugins/
    #[arg(long, short, global = true, env = "DSL_CONFIG_DIR")]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch one command: <plugin> <command> [input]
    Dispatch {
        plugin: String,
        command: String,
        /// Raw input (reads stdin if not provided)
        input: Option<String>,
    },

    /// Run a command line, piped stages included
    Run {
        /// "<plugin> <command> input | <plugin> <command> input ..."
        line: Option<String>,
    },

    /// Tokenize input with a plugin's token rules
    Tokenize {
        plugin: String,
        /// Raw input (reads stdin if not provided)
        input: Option<String>,
    },

    /// Validate a schema document
    Validate {
        /// Schema file (defaults to the config directory's schema)
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// List registered plugins and their commands
    Plugins {
        /// Show token rules and grammar rules
        #[arg(long)]
        verbose: bool,
    },
}

// =============================================================================
// MAIN
// =============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let loader = match &cli.config {
        Some(dir) => ConfigLoader::new(dir),
        None => ConfigLoader::from_env(),
    };

    let result = match cli.command {
        Commands::Dispatch {
            plugin,
            command,
            input,
        } => cmd_dispatch(&loader, &plugin, &command, input, cli.format),
        Commands::Run { line } => cmd_run(&loader, line, cli.format),
        Commands::Tokenize { plugin, input } => cmd_tokenize(&loader, &plugin, input, cli.format),
        Commands::Validate { schema } => cmd_validate(&loader, schema, cli.format),
        Commands::Plugins { verbose } => cmd_plugins(&loader, verbose, cli.format),
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::json!({ "error": e }));
            } else {
                eprintln!("{}: {}", "error".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Global registry plus any manifest plugins from the config directory
fn load_registry(loader: &ConfigLoader) -> Result<Arc<PluginRegistry>, String> {
    let registry = PluginRegistry::global();
    loader
        .register_plugins(&registry, &ResolverCatalog::with_builtins())
        .map_err(|e| format!("{:#}", e))?;
    Ok(registry)
}

/// Session over the configured schema, or an empty one when there is none
fn load_session(loader: &ConfigLoader) -> Result<Session, String> {
    let registry = load_registry(loader)?;
    let schema = match loader.schema_path() {
        Some(_) => loader.load_schema().map_err(|e| format!("{:#}", e))?,
        None => SchemaDocument::from_value(serde_json::json!({ "variables": {} })),
    };
    Session::new(registry, &schema).map_err(|e| e.to_string())
}

fn cmd_dispatch(
    loader: &ConfigLoader,
    plugin: &str,
    command: &str,
    input: Option<String>,
    format: OutputFormat,
) -> Result<(), String> {
    let raw = read_input(input)?;
    let mut session = load_session(loader)?;
    let output = session
        .execute(plugin, command, &raw)
        .map_err(|e| e.to_string())?;
    print_outputs(&[output], format)
}

fn cmd_run(
    loader: &ConfigLoader,
    line: Option<String>,
    format: OutputFormat,
) -> Result<(), String> {
    let line = read_input(line)?;
    let mut session = load_session(loader)?;
    let outputs = session.run_line(line.trim()).map_err(|e| e.to_string())?;
    print_outputs(&outputs, format)
}

fn cmd_tokenize(
    loader: &ConfigLoader,
    plugin: &str,
    input: Option<String>,
    format: OutputFormat,
) -> Result<(), String> {
    let raw = read_input(input)?;
    let registry = load_registry(loader)?;
    let descriptor = registry.lookup(plugin).map_err(|e| e.to_string())?;
    let tokens = descriptor
        .tokens()
        .tokenize(&raw)
        .map_err(|e| e.to_string())?;

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&tokens)
                    .map_err(|e| format!("JSON serialization failed: {}", e))?
            );
        }
        OutputFormat::Pretty => {
            println!("{} {} token(s)", "OK".green(), tokens.len());
            for token in &tokens {
                println!(
                    "  {:>4}..{:<4} {} {}",
                    token.start,
                    token.end,
                    token.kind.cyan(),
                    token.lexeme
                );
            }
        }
    }
    Ok(())
}

fn cmd_validate(
    loader: &ConfigLoader,
    schema: Option<PathBuf>,
    format: OutputFormat,
) -> Result<(), String> {
    let path = match schema.or_else(|| loader.schema_path()) {
        Some(path) => path,
        None => {
            return Err(format!(
                "No schema document found in {}",
                loader.config_dir().display()
            ))
        }
    };
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;

    let parsed = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        SchemaDocument::from_json_str(&content)
    } else {
        SchemaDocument::from_yaml_str(&content)
    };
    let errors = match parsed {
        Ok(doc) => validate(&doc),
        Err(e) => vec![e],
    };

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": errors.is_empty(),
                "errors": errors.iter().map(|e| {
                    serde_json::json!({ "path": e.path, "cause": e.cause.to_string() })
                }).collect::<Vec<_>>(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&output)
                    .map_err(|e| format!("JSON serialization failed: {}", e))?
            );
        }
        OutputFormat::Pretty => {
            if errors.is_empty() {
                println!("{} {} is valid", "OK".green().bold(), path.display());
            } else {
                for e in &errors {
                    println!("  {} {}: {}", "x".red(), e.path.yellow(), e.cause);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "Validation failed: {}",
            format_validation_errors(&errors)
        ))
    }
}

fn cmd_plugins(loader: &ConfigLoader, verbose: bool, format: OutputFormat) -> Result<(), String> {
    let registry = load_registry(loader)?;
    let mut descriptors = Vec::new();
    for name in registry.list_plugins() {
        descriptors.push(registry.lookup(&name).map_err(|e| e.to_string())?);
    }

    match format {
        OutputFormat::Json => {
            let output: Vec<_> = descriptors
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.name(),
                        "description": p.description(),
                        "tokens": p.tokens().rules().iter().map(|r| &r.name).collect::<Vec<_>>(),
                        "rules": p.grammar().rule_names().collect::<Vec<_>>(),
                        "commands": p.commands().map(|c| {
                            serde_json::json!({
                                "name": c.name,
                                "entry": c.entry_rule,
                                "allow_remainder": c.allow_remainder,
                                "fallback": c.fallback.is_some(),
                                "description": c.description,
                            })
                        }).collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&output)
                    .map_err(|e| format!("JSON serialization failed: {}", e))?
            );
        }
        OutputFormat::Pretty => {
            for p in &descriptors {
                println!(
                    "{} {}",
                    p.name().cyan().bold(),
                    p.description().unwrap_or_default().dimmed()
                );
                for c in p.commands() {
                    let entry = c.entry_rule.as_deref().unwrap_or("(raw input)");
                    println!(
                        "  {:<12} {:<18} {}",
                        c.name.green(),
                        entry,
                        c.description.as_deref().unwrap_or_default()
                    );
                }
                if verbose {
                    for rule in p.tokens().rules() {
                        let skip = if rule.skip { " (skip)" } else { "" };
                        println!("    token {} = {}{}", rule.name, rule.pattern.as_str(), skip);
                    }
                    let unused = unreachable_rules(
                        p.grammar(),
                        p.commands().filter_map(|c| c.entry_rule.as_deref()),
                    );
                    for rule in p.grammar().rule_names() {
                        let note = if unused.contains(&rule) { " (unreachable)" } else { "" };
                        println!("    rule  {}{}", rule, note.yellow());
                    }
                }
                println!();
            }
        }
    }
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn print_outputs(outputs: &[ResolverOutput], format: OutputFormat) -> Result<(), String> {
    match format {
        OutputFormat::Json => {
            let value = match outputs {
                [single] => serde_json::to_value(single),
                many => serde_json::to_value(many),
            }
            .map_err(|e| format!("JSON serialization failed: {}", e))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&value)
                    .map_err(|e| format!("JSON serialization failed: {}", e))?
            );
        }
        OutputFormat::Pretty => {
            for output in outputs {
                match output {
                    ResolverOutput::Tree(node) => print_tree(node, 0),
                    ResolverOutput::Value(serde_json::Value::String(s)) => println!("{}", s),
                    ResolverOutput::Value(value) => println!(
                        "{}",
                        serde_json::to_string_pretty(value)
                            .map_err(|e| format!("JSON serialization failed: {}", e))?
                    ),
                }
            }
        }
    }
    Ok(())
}

fn print_tree(node: &CstNode, depth: usize) {
    println!("{}{}", "  ".repeat(depth), node.rule.cyan().bold());
    for child in &node.children {
        match child {
            CstChild::Token(t) => println!(
                "{}{} '{}' @{}",
                "  ".repeat(depth + 1),
                t.kind.green(),
                t.lexeme,
                t.start
            ),
            CstChild::Node(n) => print_tree(n, depth + 1),
        }
    }
}

fn read_input(input: Option<String>) -> Result<String, String> {
    match input {
        Some(text) => Ok(text),
        None => {
            if io::stdin().is_terminal() {
                return Err(
                    "No input provided. Pass it as an argument or pipe it via stdin.".to_string(),
                );
            }
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            Ok(buffer)
        }
    }
}
