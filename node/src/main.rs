use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use commonware_runtime::{tokio, Metrics as _, Runner as _};
use commonware_utils::hex;
use linkchain_execution::{store::Journal, App, Services};
use linkchain_node::{
    driver::{read_blocks, Block, Driver},
    metrics::Metrics,
    Config, ValidatedConfig,
};
use linkchain_types::Cid;
use std::{fs::File, io::BufReader, path::PathBuf};
use tracing::{error, info};

fn init_tracing(config: &ValidatedConfig) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(false);
    if config.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_dry_run_report(config: &ValidatedConfig) {
    println!("dry-run report");
    println!("  log: level={} json={}", config.log_level, config.json_logs);
    println!("  worker_threads: {}", config.worker_threads);
    println!(
        "  storage: directory={} partition={}",
        config.directory.display(),
        config.partition
    );
    println!("  genesis: {}", config.genesis.display());
    match &config.blocks {
        Some(blocks) => println!("  blocks: {}", blocks.display()),
        None => println!("  blocks: none"),
    }
    match &config.metrics_file {
        Some(path) => println!("  metrics_file: {}", path.display()),
        None => println!("  metrics_file: none"),
    }
    println!(
        "  app: inv_check_period={} allow_search={} compute_unit={}",
        config.inv_check_period, config.allow_search, config.compute_unit
    );
    println!("  check_before_deliver: {}", config.check_before_deliver);
    println!("  search_limit: {}", config.search_limit);
}

fn main() {
    if let Err(err) = main_result() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn main_result() -> Result<()> {
    // Parse arguments
    let matches = Command::new("linkchain-node")
        .about("Replay blocks through a linkchain application.")
        .arg(Arg::new("config").long("config").required(true))
        .arg(
            Arg::new("genesis")
                .long("genesis")
                .help("Genesis JSON (overrides the config file)"),
        )
        .arg(
            Arg::new("blocks")
                .long("blocks")
                .help("JSON-lines block file (overrides the config file)"),
        )
        .arg(
            Arg::new("search")
                .long("search")
                .help("After replay, print the highest ranked targets linked from this CID"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Validate config and exit without opening the journal")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    // Load config
    let config_file = matches
        .get_one::<String>("config")
        .context("missing --config")?;
    let config_file = std::fs::read_to_string(config_file)
        .with_context(|| format!("Could not read config file {config_file}"))?;
    let mut config: Config =
        serde_yaml::from_str(&config_file).context("Could not parse config file")?;
    if let Some(genesis) = matches.get_one::<String>("genesis") {
        config.genesis = Some(PathBuf::from(genesis));
    }
    if let Some(blocks) = matches.get_one::<String>("blocks") {
        config.blocks = Some(PathBuf::from(blocks));
    }
    let config = config.validate().context("Invalid config")?;
    let search = match matches.get_one::<String>("search") {
        Some(query) => Some(Cid::new(query.as_bytes()).context("Invalid --search CID")?),
        None => None,
    };

    if matches.get_flag("dry-run") {
        print_dry_run_report(&config);
        println!("config ok");
        return Ok(());
    }
    init_tracing(&config);

    // Read inputs
    let genesis = std::fs::read(&config.genesis)
        .with_context(|| format!("Could not read genesis {}", config.genesis.display()))?;
    let blocks = match &config.blocks {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Could not open blocks {}", path.display()))?;
            read_blocks(BufReader::new(file))?
        }
        None => Vec::new(),
    };

    // Initialize runtime
    let cfg = tokio::Config::default()
        .with_worker_threads(config.worker_threads)
        .with_storage_directory(config.directory.clone())
        .with_catch_panics(true);
    let executor = tokio::Runner::new(cfg);

    // Start runtime
    executor.start(|context| async move {
        let context = context.with_label("linkchain");
        replay(context, config, genesis, blocks, search).await
    })
}

async fn replay(
    context: tokio::Context,
    config: ValidatedConfig,
    genesis: Vec<u8>,
    blocks: Vec<Block>,
    search: Option<Cid>,
) -> Result<()> {
    // Open application
    let store = Journal::init(context.with_label("journal"), &config.partition)
        .await
        .with_context(|| format!("Could not open journal {}", config.partition))?;
    let app_config = config.app_config();
    let services = Services::new(&app_config);
    let app = App::open(store, app_config, services).context("Could not open application")?;
    let info = app.info();
    info!(
        height = info.last_height,
        app_hash = %hex(&info.last_app_hash),
        "application opened"
    );
    let mut driver = Driver::new(app, Metrics::new(), config.check_before_deliver);

    // Replay
    driver.init(&genesis)?;
    let result = driver.run(&blocks).await.map(|outcomes| outcomes.len());

    // Persist metrics even when replay stopped on a fatal error
    if let Some(path) = &config.metrics_file {
        let encoded = driver.metrics().encode()?;
        std::fs::write(path, encoded)
            .with_context(|| format!("Could not write metrics {}", path.display()))?;
    }
    let applied = match result {
        Ok(applied) => applied,
        Err(err) => {
            error!(?err, "replay halted");
            return Err(err);
        }
    };
    let info = driver.app().info();
    info!(
        applied,
        height = info.last_height,
        app_hash = %hex(&info.last_app_hash),
        "replay finished"
    );

    if let Some(cid) = search {
        let results = driver
            .app()
            .search(&cid, config.search_limit)
            .context("Could not search")?;
        println!("{} results for {cid}", results.len());
        for (target, rank) in results {
            println!("  {target} {rank}");
        }
    }
    Ok(())
}
