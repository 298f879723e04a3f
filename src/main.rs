//! slurmsync - mirror Slurm state into a record store.
//!
//! Usage:
//!   slurmsync run [options]        Run the collectors until Ctrl+C
//!   slurmsync once [options]       Run one cycle per kind and print the reports
//!   slurmsync validate -c FILE     Validate a configuration file
//!   slurmsync classify KIND NAME.. Show where attributes are stored

use clap::{Args, Parser, Subcommand};
use slurmsync::{
    classify, ClusterSource, EntityKind, Event, EventBus, EventHandler, GlobalConfig,
    InMemorySource, InMemoryStore, Placement, RecordStore, ScontrolSource, SourceConfig,
    StoreConfig, Supervisor, YamlLoader,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// slurmsync - incremental mirror of Slurm nodes, partitions, and jobs
#[derive(Parser)]
#[command(name = "slurmsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collectors until interrupted
    Run(MirrorOptions),

    /// Run one reconciliation cycle per kind and exit
    Once(MirrorOptions),

    /// Validate a configuration file without running
    Validate {
        /// Path to the configuration file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Show where attributes of a kind are stored
    Classify {
        /// Entity kind (node, partition, job)
        #[arg(value_name = "KIND")]
        kind: EntityKind,

        /// Attribute names
        #[arg(value_name = "NAME", required = true)]
        names: Vec<String>,
    },
}

#[derive(Args)]
struct MirrorOptions {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keyspace for stored records
    #[arg(short, long)]
    keyspace: Option<String>,

    /// Record store: "memory" or "sqlite:PATH"
    #[arg(long, value_name = "STORE")]
    store: Option<StoreConfig>,

    /// Node poll interval in seconds
    #[arg(long, value_name = "SECS")]
    node_interval: Option<u64>,

    /// Partition poll interval in seconds
    #[arg(long, value_name = "SECS")]
    partition_interval: Option<u64>,

    /// Job poll interval in seconds
    #[arg(long, value_name = "SECS")]
    job_interval: Option<u64>,

    /// Log every changed field
    #[arg(short, long)]
    verbose: bool,
}

impl MirrorOptions {
    /// Load the configuration file (if any) and apply command-line overrides.
    fn resolve(self) -> Result<GlobalConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => YamlLoader::load_global_config(path)?,
            None => GlobalConfig::default(),
        };

        if let Some(keyspace) = self.keyspace {
            config.keyspace = keyspace;
        }
        if let Some(store) = self.store {
            config.store = store;
        }
        for (kind, secs) in [
            (EntityKind::Node, self.node_interval),
            (EntityKind::Partition, self.partition_interval),
            (EntityKind::Job, self.job_interval),
        ] {
            if let Some(secs) = secs {
                config.intervals.set(kind, secs);
            }
        }
        config.verbose |= self.verbose;

        YamlLoader::validate(&config)?;
        Ok(config)
    }
}

/// Logging event handler for cycle summaries and failures.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::CollectorStarted { kind, known, .. } => {
                info!("{} collector started ({} known)", kind, known);
            }
            Event::CycleCompleted { report, .. } if report.writes() > 0 => {
                info!("{}", report);
            }
            Event::CycleCompleted { report, .. } if report.has_failures() => {
                warn!("{}", report);
            }
            Event::CollectorStopped { kind, .. } => {
                info!("{} collector stopped", kind);
            }
            _ => {}
        }
    }
}

/// Store opened from configuration.
struct OpenStore {
    store: Arc<dyn RecordStore>,
    #[cfg(feature = "sqlite")]
    sqlite: Option<Arc<slurmsync::SqliteStore>>,
}

impl OpenStore {
    async fn open(config: &GlobalConfig) -> Result<Self, Box<dyn std::error::Error>> {
        match &config.store {
            StoreConfig::Memory => {
                warn!("Using the in-memory store; records are lost on exit");
                Ok(Self {
                    store: Arc::new(InMemoryStore::new()),
                    #[cfg(feature = "sqlite")]
                    sqlite: None,
                })
            }
            #[cfg(feature = "sqlite")]
            StoreConfig::Sqlite { path } => {
                info!("Opening SQLite store at {} (keyspace '{}')", path.display(), config.keyspace);
                let sqlite =
                    Arc::new(slurmsync::SqliteStore::new(path, config.keyspace.clone()).await?);
                Ok(Self {
                    store: sqlite.clone(),
                    sqlite: Some(sqlite),
                })
            }
            #[cfg(not(feature = "sqlite"))]
            StoreConfig::Sqlite { .. } => {
                Err("this build of slurmsync does not include SQLite support".into())
            }
        }
    }

    async fn close(self) {
        #[cfg(feature = "sqlite")]
        if let Some(sqlite) = self.sqlite {
            sqlite.close().await;
        }
    }
}

fn open_source(config: &GlobalConfig) -> Result<Arc<dyn ClusterSource>, Box<dyn std::error::Error>> {
    match &config.source {
        SourceConfig::Scontrol {
            bin_dir,
            timeout_secs,
        } => {
            let mut source =
                ScontrolSource::new().with_timeout(Duration::from_secs(*timeout_secs));
            if let Some(dir) = bin_dir {
                source = source.with_bin_dir(dir);
            }
            Ok(Arc::new(source))
        }
        SourceConfig::Snapshot { path } => {
            info!("Reading cluster snapshot from {}", path.display());
            Ok(Arc::new(InMemorySource::from_snapshot_file(path)?))
        }
    }
}

async fn build_supervisor(
    config: &GlobalConfig,
    store: Arc<dyn RecordStore>,
) -> Result<Supervisor<dyn ClusterSource, dyn RecordStore>, Box<dyn std::error::Error>> {
    let event_bus = Arc::new(EventBus::new());
    event_bus.register(Arc::new(LoggingHandler)).await;

    let mut supervisor = Supervisor::new(open_source(config)?, store)
        .with_event_bus(event_bus)
        .with_verbose(config.verbose);
    for kind in EntityKind::ALL {
        supervisor = supervisor.with_interval(kind, config.intervals.for_kind(kind));
    }
    Ok(supervisor)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(options) => run(options.resolve()?).await?,
        Commands::Once(options) => once(options.resolve()?).await?,
        Commands::Validate { config } => validate(config)?,
        Commands::Classify { kind, names } => classify_names(kind, &names),
    }

    Ok(())
}

/// Run the collectors until Ctrl+C.
async fn run(config: GlobalConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = OpenStore::open(&config).await?;
    let supervisor = build_supervisor(&config, Arc::clone(&store.store)).await?;

    let handle = match supervisor.start().await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Startup failed: {}", e);
            store.close().await;
            return Err(e.into());
        }
    };
    info!("Mirroring into keyspace '{}'. Press Ctrl+C to stop", config.keyspace);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    let result = handle.shutdown().await;
    store.close().await;
    result?;

    info!("Goodbye!");
    Ok(())
}

/// Run one cycle per kind and print the reports.
async fn once(config: GlobalConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = OpenStore::open(&config).await?;
    let supervisor = build_supervisor(&config, Arc::clone(&store.store)).await?;

    let result = supervisor.run_once().await;
    store.close().await;

    for report in result? {
        println!("{}", report);
    }
    Ok(())
}

/// Validate a configuration file.
fn validate(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating configuration: {}", path.display());

    match YamlLoader::load_global_config(&path) {
        Ok(config) => {
            info!("Configuration is valid:");
            info!("  keyspace: {}", config.keyspace);
            info!("  store: {:?}", config.store);
            info!("  source: {:?}", config.source);
            for kind in EntityKind::ALL {
                info!("  {} interval: {:?}", kind, config.intervals.for_kind(kind));
            }
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Print the placement of each attribute name.
fn classify_names(kind: EntityKind, names: &[String]) {
    for name in names {
        let placement = match classify(kind, name) {
            Placement::Identity => "identity".to_string(),
            Placement::Core => "core".to_string(),
            Placement::Bucket(bucket) => format!("bucket '{}'", bucket),
            Placement::Overflow => "overflow".to_string(),
            Placement::Dropped => "dropped".to_string(),
        };
        println!("{} {}: {}", kind, name, placement);
    }
}
