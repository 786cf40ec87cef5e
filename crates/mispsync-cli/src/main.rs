//! mispsync CLI
//!
//! Thin wrapper around mispsync-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! export MISPSYNC_URL=https://misp.partner.example
//! export MISPSYNC_AUTH_KEY=...
//!
//! # Show the peer's version and capabilities
//! mispsync info
//!
//! # Ask about a single capability
//! mispsync supports sighting-filter-dedup
//!
//! # Push an event (created or updated as needed)
//! mispsync --signing-key instance.key push-event event.json
//!
//! # Pull events by id
//! mispsync pull-events 12 13 14
//!
//! # Conditional event index
//! mispsync index --token '"abc123-gzip"'
//!
//! # Push sightings of one event, pull sightings into a JSONL file
//! mispsync push-sightings <event_uuid> sightings.json
//! mispsync pull-sightings --store sightings.jsonl
//!
//! # Generate an instance signing key
//! mispsync keygen --out instance.key
//! ```

mod http_client;
mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mispsync_core::sync::{IndexOutcome, ProposalOutcome};
use mispsync_core::{
    AuthKey, Capability, Ed25519Signer, EventSync, GalaxyClusterSync, JsonlAuditSink,
    NamedParams, PeerDescriptor, ProposalSync, Record, RecordKind, RecordSync, Sighting,
    SightingSync, SyncConfig, SyncTransport,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::http_client::ReqwestClient;
use crate::store::JsonlSightingStore;

/// mispsync - federation sync client
#[derive(Parser)]
#[command(name = "mispsync")]
#[command(version)]
#[command(about = "Exchange events and sightings with a federation peer")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Base URL of the peer
    #[arg(long, env = "MISPSYNC_URL", global = true)]
    url: Option<String>,

    /// Authentication key for the peer
    #[arg(long, env = "MISPSYNC_AUTH_KEY", global = true, hide_env_values = true)]
    auth_key: Option<String>,

    /// Local id of the peer entry (used in logs and audit file names)
    #[arg(long, default_value_t = 1, global = true)]
    server_id: u64,

    /// Display name of the peer
    #[arg(long, default_value = "peer", global = true)]
    name: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    timeout: u64,

    /// Hex-encoded Ed25519 seed used to sign protected events
    #[arg(long, global = true)]
    signing_key: Option<PathBuf>,

    /// Write exchange records to JSONL files in this directory
    #[arg(long, global = true)]
    audit_dir: Option<PathBuf>,

    /// Also record outbound payloads (needs --audit-dir to be persisted)
    #[arg(long, global = true)]
    sync_audit: bool,

    /// Path of the peer's version endpoint
    #[arg(long, global = true)]
    info_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the peer's version and capabilities
    Info,

    /// Check a single capability (prints yes/no)
    Supports {
        /// Capability name, e.g. sighting-filter-dedup
        #[arg(value_parser = parse_capability)]
        capability: Capability,
    },

    /// Push an event from a JSON file
    PushEvent {
        /// File holding `{"Event": {...}}`
        file: PathBuf,
    },

    /// Pull events by id, printing one JSON line per event
    PullEvents {
        /// Event ids on the peer
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Fetch the event index
    Index {
        /// Stored ETag from an earlier index call
        #[arg(long)]
        token: Option<String>,

        /// JSON filter sent as the request body
        #[arg(long, default_value = r#"{"minimal": true, "published": 1}"#)]
        filter: String,
    },

    /// Push sightings of one event from a JSON array file
    PushSightings {
        event_uuid: String,
        file: PathBuf,
    },

    /// Pull sightings of all matching events into a JSONL file
    PullSightings {
        /// Output file, appended to
        #[arg(long)]
        store: PathBuf,

        /// JSON filter for the event index
        #[arg(long, default_value = r#"{"minimal": true, "published": 1}"#)]
        filter: String,
    },

    /// Push a galaxy cluster from a JSON file
    PushCluster { file: PathBuf },

    /// Pull proposals, printing one JSON line each
    Proposals {
        /// Only proposals newer than this unix timestamp
        #[arg(long)]
        since: Option<i64>,
    },

    /// Run the POST connectivity self test
    PostTest {
        #[arg(long, default_value = "mispsync connectivity test")]
        message: String,
    },

    /// Generate an Ed25519 signing key
    Keygen {
        /// Where to write the hex-encoded seed
        #[arg(long)]
        out: PathBuf,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

fn parse_capability(s: &str) -> Result<Capability, String> {
    s.parse::<Capability>().map_err(|e| {
        let known: Vec<_> = Capability::ALL.iter().map(Capability::name).collect();
        format!("{}. Known capabilities: {}", e, known.join(", "))
    })
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Load a hex-encoded 32-byte seed
fn load_signer(path: &Path) -> Result<Ed25519Signer> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read signing key {}", path.display()))?;
    let seed = hex::decode(raw.trim()).map_err(|e| anyhow::anyhow!("Invalid hex format: {}", e))?;
    Ok(Ed25519Signer::from_slice(&seed)?)
}

fn keygen(out: &Path) -> Result<()> {
    if out.exists() {
        anyhow::bail!("Refusing to overwrite existing key {}", out.display());
    }
    let mut seed = [0u8; 32];
    getrandom::getrandom(&mut seed)
        .map_err(|e| anyhow::anyhow!("Failed to gather randomness: {}", e))?;
    std::fs::write(out, hex::encode(seed))
        .with_context(|| format!("Failed to write {}", out.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(out, std::fs::Permissions::from_mode(0o600))?;
    }

    let signer = Ed25519Signer::from_seed(&seed);
    println!("Signing key written to {}", out.display());
    println!("  Public key: {}", hex::encode(signer.verifying_key().to_bytes()));
    Ok(())
}

fn connect(cli: &Cli, cancel: CancellationToken) -> Result<SyncTransport> {
    let url = cli
        .url
        .as_deref()
        .context("No peer URL given (use --url or MISPSYNC_URL)")?;
    let auth_key = cli
        .auth_key
        .as_deref()
        .context("No auth key given (use --auth-key or MISPSYNC_AUTH_KEY)")?;

    let peer = PeerDescriptor::new(cli.server_id, cli.name.as_str(), url, AuthKey::new(auth_key))?;
    let mut config = SyncConfig::default()
        .with_sync_audit(cli.sync_audit)
        .with_user_agent(concat!("mispsync/", env!("CARGO_PKG_VERSION")));
    if let Some(path) = &cli.info_path {
        config = config.with_info_path(path.as_str());
    }

    let client = ReqwestClient::new(Duration::from_secs(cli.timeout), cancel)?;
    let mut transport = SyncTransport::new(peer, config, Arc::new(client))?;

    if let Some(path) = &cli.signing_key {
        transport = transport.with_signer(Arc::new(load_signer(path)?));
    }
    if let Some(dir) = &cli.audit_dir {
        let sink = JsonlAuditSink::new(dir, cli.server_id)
            .with_context(|| format!("Failed to open audit log in {}", dir.display()))?;
        transport = transport.with_audit_sink(Arc::new(sink));
    }
    Ok(transport)
}

fn print_json_line(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    // Ctrl-C cancels in-flight requests; the core aborts the running loop
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            on_signal.cancel();
        }
    });

    let transport = match &cli.command {
        Commands::Keygen { out } => return keygen(out),
        _ => connect(&cli, cancel)?,
    };

    match &cli.command {
        Commands::Info => {
            let caps = transport.fetch_info().await?;
            println!("Peer: {}", transport.peer());
            println!("  Version: {}", caps.version());
            if caps.parsed_version().is_none() {
                println!("  (version not in major.minor.patch form)");
            }
            println!();
            println!("Capabilities:");
            for (capability, supported) in caps.iter() {
                let mark = if supported { "yes" } else { "no" };
                println!("  {:<28} {}", capability.name(), mark);
            }
        }

        Commands::Supports { capability } => {
            let supported = transport.supports(*capability).await?;
            println!("{}", if supported { "yes" } else { "no" });
        }

        Commands::PushEvent { file } => {
            let record = Record::event(read_json(file)?)?;
            let response = EventSync::new(&transport).push(&record).await?;
            println!("Pushed event {} (HTTP {})", record.label(), response.status());
        }

        Commands::PullEvents { ids } => {
            let report = RecordSync::new(&transport, RecordKind::Event)
                .pull(ids, &NamedParams::new().with("deleted", 0))
                .await?;
            for record in &report.records {
                print_json_line(record)?;
            }
            for skipped in &report.skipped {
                eprintln!("Skipped {}: {}", skipped.id, skipped.reason);
            }
            eprintln!(
                "Pulled {} event(s), {} skipped",
                report.records.len(),
                report.skipped_count()
            );
        }

        Commands::Index { token, filter } => {
            let filter: Value = serde_json::from_str(filter).context("Invalid --filter JSON")?;
            match EventSync::new(&transport)
                .index(&filter, token.as_deref())
                .await?
            {
                IndexOutcome::NotModified => println!("Not modified"),
                IndexOutcome::Fresh {
                    entries,
                    etag,
                    malformed,
                } => {
                    for entry in &entries {
                        println!("{}\t{}\t{}", entry.id, entry.uuid, entry.timestamp);
                    }
                    for skipped in &malformed {
                        eprintln!("Skipped {}: {}", skipped.id, skipped.reason);
                    }
                    if let Some(etag) = etag {
                        eprintln!("ETag: {}", etag);
                    }
                }
            }
        }

        Commands::PushSightings { event_uuid, file } => {
            let Value::Array(items) = read_json(file)? else {
                anyhow::bail!("{} must hold a JSON array of sightings", file.display());
            };
            let sightings = items
                .into_iter()
                .map(Sighting::from_value)
                .collect::<Result<Vec<_>, _>>()?;
            let report = SightingSync::new(&transport)
                .push_for_event(event_uuid, sightings)
                .await?;
            println!(
                "Uploaded {} sighting(s), {} already on the peer",
                report.uploaded, report.excluded
            );
        }

        Commands::PullSightings { store, filter } => {
            let filter: Value = serde_json::from_str(filter).context("Invalid --filter JSON")?;
            let store = JsonlSightingStore::open(store)
                .with_context(|| format!("Failed to open {}", store.display()))?;
            let report = SightingSync::new(&transport).pull(&filter, &store).await?;
            println!(
                "Saved {} sighting(s) from {} event(s), {} skipped",
                report.saved,
                report.events_processed,
                report.skipped.len()
            );
        }

        Commands::PushCluster { file } => {
            let cluster = Record::galaxy_cluster(read_json(file)?)?;
            let response = GalaxyClusterSync::new(&transport).push(&cluster).await?;
            println!("Pushed cluster {} (HTTP {})", cluster.label(), response.status());
        }

        Commands::Proposals { since } => {
            let mut params = NamedParams::new().with("all", 1);
            if let Some(since) = since {
                params = params.with("timestamp", since);
            }
            match ProposalSync::new(&transport).fetch(&params).await? {
                ProposalOutcome::Unsupported => println!("Peer does not serve proposals"),
                ProposalOutcome::Fetched(items) => {
                    for item in &items {
                        print_json_line(item)?;
                    }
                }
            }
        }

        Commands::PostTest { message } => {
            let outcome = transport.post_test(message).await?;
            if !outcome.echoed {
                anyhow::bail!(
                    "Peer answered HTTP {} but did not echo the test string",
                    outcome.response.status()
                );
            }
            println!("POST test passed");
        }

        // Handled before connecting
        Commands::Keygen { .. } => {}
    }

    Ok(())
}
