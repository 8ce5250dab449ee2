pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use basketry_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use basketry_core::strategy::ExecutionStrategy;

use commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "basketry",
    about = "Product association engine CLI",
    long_about = "Discover which products are bought together, maintain the association table, \
                  and report on the stored graph.",
    after_help = "Examples:\n  basketry migrate\n  basketry seed\n  basketry run --window-days 90 --min-support 3\n  basketry insights --top 10\n  basketry prune\n  basketry cleanup-stale --max-age-days 90"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a basketry.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the sqlite database URL")]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Analyze order history and rebuild the product association table")]
    Run {
        #[arg(long, help = "Trailing analysis window in days")]
        window_days: Option<u32>,
        #[arg(long, help = "Minimum co-occurrence frequency a pair must reach")]
        min_support: Option<i64>,
        #[arg(long, help = "Multiplier for pairs spanning different root categories")]
        cross_category_boost: Option<f64>,
        #[arg(long, help = "Multiplier for pairs sharing a non-generic brand")]
        same_brand_penalty: Option<f64>,
        #[arg(long, help = "Maximum associations any single product may anchor")]
        per_product_cap: Option<u32>,
        #[arg(long, help = "Count raw occurrences instead of recency-weighted ones")]
        unweighted: bool,
        #[arg(
            long,
            value_name = "STRATEGY",
            help = "Bypass volume-based selection (direct|single-pass|incremental)"
        )]
        force_strategy: Option<ExecutionStrategy>,
    },
    #[command(about = "Delete stored associations below the minimum support threshold")]
    Prune {
        #[arg(long, help = "Support threshold; defaults to the configured one")]
        min_support: Option<i64>,
    },
    #[command(name = "cleanup-stale", about = "Delete associations outside the retention window")]
    CleanupStale {
        #[arg(long, help = "Retention window in days; defaults to the configured one")]
        max_age_days: Option<u32>,
    },
    #[command(about = "Report top pairs and category/brand affinity matrices")]
    Insights {
        #[arg(long, default_value_t = 10, help = "Row limit per insight view")]
        top: i64,
    },
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the deterministic demo catalog and order history")]
    Seed,
    #[command(about = "Print the effective configuration")]
    Config,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Prune { .. } => "prune",
            Self::CleanupStale { .. } => "cleanup-stale",
            Self::Insights { .. } => "insights",
            Self::Migrate => "migrate",
            Self::Seed => "seed",
            Self::Config => "config",
        }
    }

    fn overrides(&self) -> ConfigOverrides {
        match self {
            Self::Run {
                window_days,
                min_support,
                cross_category_boost,
                same_brand_penalty,
                per_product_cap,
                unweighted,
                force_strategy,
            } => ConfigOverrides {
                window_days: *window_days,
                min_support: *min_support,
                cross_category_boost: *cross_category_boost,
                same_brand_penalty: *same_brand_penalty,
                per_product_cap: *per_product_cap,
                recency_weighting: unweighted.then_some(false),
                force_strategy: *force_strategy,
                ..ConfigOverrides::default()
            },
            Self::Prune { min_support } => {
                ConfigOverrides { min_support: *min_support, ..ConfigOverrides::default() }
            }
            _ => ConfigOverrides::default(),
        }
    }
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let mut overrides = cli.command.overrides();
    overrides.database_url = cli.database_url.clone();

    let config = match AppConfig::load(LoadOptions {
        config_path: cli.config.clone(),
        require_file: false,
        overrides,
    }) {
        Ok(config) => config,
        Err(error) => {
            let result = CommandResult::failure(
                cli.command.name(),
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
            println!("{}", result.output);
            return ExitCode::from(result.exit_code);
        }
    };

    init_logging(&config);

    let result = match cli.command {
        Command::Run { .. } => commands::run::run(&config),
        Command::Prune { .. } => commands::prune::run(&config),
        Command::CleanupStale { max_age_days } => commands::cleanup_stale::run(&config, max_age_days),
        Command::Insights { top } => commands::insights::run(&config, top),
        Command::Migrate => commands::migrate::run(&config),
        Command::Seed => commands::seed::run(&config),
        Command::Config => {
            CommandResult { exit_code: 0, output: commands::config::run(&config) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
