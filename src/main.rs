use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use flowstat::command::{ProxyStatusCommand, DUMP_CONN_TYPE_FIELD};
use flowstat::config::{Config, ConfigError};
use flowstat::report::{CallerIdentity, RoleName};
use flowstat::simulation::Simulation;
use flowstat::utils::{format_bytes, format_duration};
use flowstat::FlowStat;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowstat")]
#[command(about = "Privilege-aware outbound connection flow reporting for sharded-cluster proxies")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run simulated pool traffic, then issue a proxyStatus query
    Simulate {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/dev.toml")]
        config: PathBuf,
        /// Requested tier: none, aggregated or all (anything else means none)
        #[arg(short, long)]
        dump_conn_type: Option<String>,
        /// Caller role as role@db; repeat for several roles
        #[arg(short, long = "role")]
        roles: Vec<String>,
        /// Caller user name
        #[arg(short, long, default_value = "operator")]
        user: String,
        /// Pretty-print the response document
        #[arg(long)]
        pretty: bool,
    },
    /// Generate an example configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            dump_conn_type,
            roles,
            user,
            pretty,
        } => {
            run_simulation(config, dump_conn_type, roles, user, pretty).await?;
        }
        Commands::Config { output } => {
            generate_config(output)?;
        }
        Commands::Validate { config } => {
            validate_config(config)?;
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}

async fn run_simulation(
    config_path: PathBuf,
    dump_conn_type: Option<String>,
    roles: Vec<String>,
    user: String,
    pretty: bool,
) -> anyhow::Result<()> {
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config)?;

    info!("Starting flowstat v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {:?}", config_path);

    let roles = roles
        .iter()
        .map(|r| r.parse::<RoleName>())
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid --role")?;
    let caller = CallerIdentity::authenticated(user, roles);

    let flowstat = FlowStat::from_config(&config)?;
    let simulation = Simulation::new(flowstat.tracker(), config.simulation.clone());
    let outcome = simulation.run().await?;

    let mut request = Map::new();
    request.insert(ProxyStatusCommand::NAME.to_string(), json!(1));
    if let Some(tier) = dump_conn_type {
        request.insert(DUMP_CONN_TYPE_FIELD.to_string(), json!(tier));
    }
    let response = flowstat.command().run(&caller, &Value::Object(request))?;

    let rendered = if pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", rendered);

    eprintln!(
        "simulated {} attempts ({} failed) in {}; {} sent / {} received on closed connections; \
         {} held open",
        outcome.tally.attempts,
        outcome.tally.failed,
        format_duration(outcome.elapsed),
        format_bytes(outcome.tally.bytes_sent),
        format_bytes(outcome.tally.bytes_received),
        outcome.held.len()
    );

    flowstat.shutdown();
    Ok(())
}

fn generate_config(output: PathBuf) -> anyhow::Result<()> {
    println!("Generating configuration file: {:?}", output);

    Config::create_example_config(&output).context("Failed to generate config")?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  flowstat simulate --config {:?} --dump-conn-type all --role root@admin", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    match Config::load_from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid");
            println!("  Aggregation: {:?}", config.registry.aggregation);
            println!("  Record map shards: {}", config.registry.shard_amount);
            println!("  Elevated roles: {}", config.reporting.elevated_roles.join(", "));
            println!(
                "  Simulation targets: {} backends",
                config.simulation.targets.len()
            );
            for (i, target) in config.simulation.targets.iter().enumerate() {
                println!("    {}: {} ({:?})", i + 1, target.host, target.role);
            }
        }
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            match &e {
                ConfigError::IoError(msg) => eprintln!("  File error: {}", msg),
                ConfigError::ParseError(msg) => eprintln!("  Parse error: {}", msg),
                ConfigError::ValidationError(msg) => eprintln!("  Validation error: {}", msg),
                ConfigError::SerializeError(msg) => eprintln!("  Serialization error: {}", msg),
            }
            bail!(e);
        }
    }

    Ok(())
}

fn show_version() {
    println!("flowstat v{}", env!("CARGO_PKG_VERSION"));
    println!("Privilege-aware outbound connection flow reporting for sharded-cluster proxies");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!();
    println!("Features:");
    println!("  • Sharded, low-contention flow registry");
    println!("  • none / aggregated / all verbosity tiers");
    println!("  • Role-based redaction of per-connection detail");
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    // RUST_LOG wins over the configured level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match config.logging.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized at level: {}", config.logging.level);
    Ok(())
}
