//! hidemenot CLI
//!
//! Entry point for the `hidemenot` command-line tool.

use clap::{Parser, Subcommand};
use hidemenot::config::DEFAULT_SECRET_DB;
use hidemenot::container::{self, read_image};
use hidemenot::handlers::{RetrievalResponse, Service};
use hidemenot::{
    EvictionScheduler, FsArtifactStore, JsonSecretStore, LifecyclePolicy, ManualScheduler,
    Redeemer, SecretLifecycleManager, ServiceConfig, SystemClock, TokioScheduler,
};
use hm_classifier::samples::{self, SampleKind};
use hm_stego::{BitIndex, Image};
use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Config file picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG_FILE: &str = "hidemenot.toml";

/// Env var holding the log filter
const LOG_ENV: &str = "HIDEMENOT_LOG";

#[derive(Parser)]
#[command(name = "hidemenot")]
#[command(about = "Polyglot-triggered secret minting and bit-plane steganography", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a file would trigger the crash flow
    Inspect {
        file: PathBuf,
    },

    /// Write a sample polyglot file
    Polyglot {
        /// png-with-jfif, jpeg-with-png or minimal
        kind: SampleKind,
        out: PathBuf,
    },

    /// Hide a message in an image (output must be PNG, BMP or PNM)
    Encode {
        input: PathBuf,
        message: String,

        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Bit plane (0 or 3)
        #[arg(long, default_value_t = 0)]
        bit: u8,
    },

    /// Read messages from images on both planes
    Decode {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Upload a file through the crash detector
    Upload {
        file: PathBuf,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Mint a secret and its artifacts
    Trigger {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Stay running until every artifact has been evicted
        #[arg(long)]
        wait: bool,
    },

    /// Retrieve an artifact
    Fetch {
        name: String,

        /// Host header presented by the caller
        #[arg(long)]
        host: String,

        /// Write content here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Redeem a flag found in free-form text
    Redeem {
        text: String,

        #[arg(long = "as")]
        redeemer: String,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Show the crash hint and decode the latest marked image
    Reveal {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Evict everything past its deadline
    Sweep {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { file } => run_inspect(&file),
        Commands::Polyglot { kind, out } => run_polyglot(kind, &out),
        Commands::Encode {
            input,
            message,
            output,
            bit,
        } => run_encode(&input, &message, &output, bit),
        Commands::Decode { files } => run_decode(&files),
        Commands::Upload { file, config } => run_upload(&file, config),
        Commands::Trigger { config, wait } => run_trigger(config, wait),
        Commands::Fetch {
            name,
            host,
            output,
            config,
        } => run_fetch(&name, &host, output, config),
        Commands::Redeem {
            text,
            redeemer,
            config,
        } => run_redeem(&text, &redeemer, config),
        Commands::Reveal { config } => run_reveal(config),
        Commands::Sweep { config } => run_sweep(config),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => fail(format!("serializing output: {}", e)),
    }
}

fn read_file(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|e| fail(format!("reading {}: {}", path.display(), e)))
}

fn load_image(path: &Path) -> Image {
    read_image(&read_file(path)).unwrap_or_else(|e| fail(format!("{}: {}", path.display(), e)))
}

fn load_config(path: Option<PathBuf>) -> ServiceConfig {
    let path = match path {
        Some(p) => p,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => PathBuf::from(DEFAULT_CONFIG_FILE),
        None => return ServiceConfig::default(),
    };
    ServiceConfig::from_file(&path)
        .unwrap_or_else(|e| fail(format!("loading {}: {}", path.display(), e)))
}

fn open_service(config: &ServiceConfig, scheduler: Arc<dyn EvictionScheduler>) -> Service {
    let artifacts = FsArtifactStore::new(&config.artifact_root).unwrap_or_else(|e| {
        fail(format!(
            "opening artifact store {}: {}",
            config.artifact_root.display(),
            e
        ))
    });
    let secret_db = if config.secret_db.as_os_str().is_empty() {
        PathBuf::from(DEFAULT_SECRET_DB)
    } else {
        config.secret_db.clone()
    };
    let secrets = JsonSecretStore::open(&secret_db)
        .unwrap_or_else(|e| fail(format!("opening {}: {}", secret_db.display(), e)));

    let mut builder = SecretLifecycleManager::builder(Arc::new(artifacts), Arc::new(secrets))
        .clock(Arc::new(SystemClock))
        .scheduler(scheduler)
        .policy(LifecyclePolicy::from(config));
    if let Some(path) = &config.baseline_image {
        builder = builder.baseline(load_image(path));
    }
    let manager = builder
        .open()
        .unwrap_or_else(|e| fail(format!("loading state: {}", e)));
    Service::new(manager, config)
}

/// Open with a manual scheduler and apply evictions that fell due while no
/// process was running.
fn open_oneshot(config_path: Option<PathBuf>) -> Service {
    let config = load_config(config_path);
    let scheduler = Arc::new(ManualScheduler::new());
    let service = open_service(&config, scheduler.clone());
    scheduler.run_due(service.manager().now());
    service
}

fn run_inspect(file: &Path) {
    print_json(&hm_classifier::inspect(&read_file(file)));
}

fn run_polyglot(kind: SampleKind, out: &Path) {
    let bytes = samples::build(kind);
    if let Err(e) = fs::write(out, &bytes) {
        fail(format!("writing {}: {}", out.display(), e));
    }
    print_json(&json!({
        "file": out.display().to_string(),
        "size": bytes.len(),
        "inspection": hm_classifier::inspect(&bytes),
    }));
}

fn run_encode(input: &Path, message: &str, output: &Path, bit: u8) {
    let bit = BitIndex::try_from(bit).unwrap_or_else(|e| fail(e));
    let format = container::format_for_path(output)
        .unwrap_or_else(|e| fail(format!("{}: {}", output.display(), e)));
    let cover = load_image(input);
    let capacity = hm_stego::max_message_len(&cover);
    if message.len() > capacity {
        tracing::warn!(
            length = message.len(),
            capacity,
            "message exceeds capacity and will be truncated"
        );
    }
    let marked = hm_stego::encode(&cover, message, bit);
    let bytes = container::write_image(&marked, format)
        .unwrap_or_else(|e| fail(format!("{}: {}", output.display(), e)));
    if let Err(e) = fs::write(output, bytes) {
        fail(format!("writing {}: {}", output.display(), e));
    }
    print_json(&json!({
        "file": output.display().to_string(),
        "bit": bit.position(),
        "capacity": capacity,
    }));
}

fn run_decode(files: &[PathBuf]) {
    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let file = path.display().to_string();
        let image = match fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|b| read_image(&b).map_err(|e| e.to_string()))
        {
            Ok(image) => image,
            Err(e) => {
                results.push(json!({ "file": file, "error": e }));
                continue;
            }
        };
        let mut planes = serde_json::Map::new();
        for bit in [BitIndex::Standard, BitIndex::Alternate] {
            let text = hm_stego::decode(&image, bit).unwrap_or_default();
            planes.insert(format!("bit{}", bit), json!(text));
        }
        results.push(json!({ "file": file, "planes": planes }));
    }
    print_json(&results);
}

fn run_upload(file: &Path, config: Option<PathBuf>) {
    let service = open_oneshot(config);
    match service.handle_upload(&read_file(file)) {
        Ok(response) => print_json(&response),
        Err(e) => fail(e),
    }
}

fn run_trigger(config_path: Option<PathBuf>, wait: bool) {
    if !wait {
        let service = open_oneshot(config_path);
        let receipt = service.manager().trigger().unwrap_or_else(|e| fail(e));
        print_json(&json!({
            "identifier": receipt.identifier,
            "secret_persisted": receipt.secret_persisted,
            "artifacts": receipt.artifacts,
        }));
        return;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap_or_else(|e| fail(format!("starting runtime: {}", e)));
    let config = load_config(config_path);
    let scheduler = Arc::new(TokioScheduler::new(
        runtime.handle().clone(),
        Arc::new(SystemClock),
    ));
    let service = open_service(&config, scheduler.clone());
    let receipt = service.manager().trigger().unwrap_or_else(|e| fail(e));
    print_json(&json!({
        "identifier": receipt.identifier,
        "secret_persisted": receipt.secret_persisted,
        "artifacts": receipt.artifacts,
    }));
    let _ = std::io::stdout().flush();

    runtime.block_on(async {
        while scheduler.pending() > 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    });
    tracing::info!(identifier = %receipt.identifier, "all evictions done");
}

fn run_fetch(name: &str, host: &str, output: Option<PathBuf>, config: Option<PathBuf>) {
    let service = open_oneshot(config);
    match service.fetch_artifact(name, host) {
        RetrievalResponse::Content(bytes) => {
            let written = match &output {
                Some(path) => fs::write(path, &bytes),
                None => std::io::stdout().write_all(&bytes),
            };
            if let Err(e) = written {
                fail(format!("writing content: {}", e));
            }
        }
        RetrievalResponse::Gone => {
            print_json(&json!({ "status": "gone", "name": name }));
            process::exit(1);
        }
        RetrievalResponse::Redirect { location } => {
            print_json(&json!({ "status": "redirect", "location": location }));
        }
    }
}

fn run_redeem(text: &str, redeemer: &str, config: Option<PathBuf>) {
    let service = open_oneshot(config);
    print_json(&service.redeem(text, Redeemer::new(redeemer)));
}

fn run_reveal(config: Option<PathBuf>) {
    let service = open_oneshot(config);
    let decoded = service.decode_alternative().unwrap_or_else(|e| fail(e));
    print_json(&json!({
        "crash_image_url": service.crash_hint(true),
        "alternative": decoded,
    }));
}

fn run_sweep(config: Option<PathBuf>) {
    let service = open_oneshot(config);
    let report = service.manager().sweep();
    print_json(&json!({
        "artifacts_evicted": report.artifacts_evicted,
        "secrets_evicted": report.secrets_evicted,
        "orphans_removed": report.orphans_removed,
        "errors": report.errors,
    }));
}
