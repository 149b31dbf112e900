use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tess_audit::{verify_hash_chain, VerifyResult};

mod commands;

use commands::enrich::{LocateArgs, SitesArgs};
use commands::reconcile::{ReconcileArgs, VersionOpenArgs};

#[derive(Parser)]
#[command(name = "tess")]
#[command(about = "TESS photometer metadata: interval histories and cross-store reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Relational store commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> local ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print one attribute stream with breaks and violations
    History {
        /// `pg` or `doc:<path>`
        #[arg(long)]
        store: String,
        #[arg(long)]
        mac: String,
        /// name | zero_point | location
        #[arg(long)]
        attribute: String,
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Validate every stream, classify name histories, grade zero points
    Check {
        #[arg(long)]
        store: String,
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Repair gaps and overlaps through the store (dry-run unless --live)
    Normalize {
        #[arg(long)]
        store: String,
        #[arg(long, default_value_t = false)]
        live: bool,
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Plan (and optionally apply) the changeset that aligns the untrusted store
    Reconcile {
        /// Relational side: `pg` or `doc:<path>`
        #[arg(long)]
        relational: String,
        /// Document side: `doc:<path>` (default: stores.document.path)
        #[arg(long)]
        document: Option<String>,
        /// relational | document (overrides /reconcile/trust)
        #[arg(long)]
        trust: Option<String>,
        /// Overrides /reconcile/tolerance_secs
        #[arg(long = "tolerance-secs")]
        tolerance_secs: Option<i64>,
        #[arg(long, default_value_t = false)]
        live: bool,
        /// Review report; `.csv` writes `;`-separated CSV, anything else JSON
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Attribute versioning
    Version {
        #[command(subcommand)]
        cmd: VersionCmd,
    },

    /// Reverse-geocode a site
    Locate {
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Previous longitude, to classify the move
        #[arg(long = "from-lon", allow_hyphen_values = true, requires = "from_lat")]
        from_lon: Option<f64>,
        #[arg(long = "from-lat", allow_hyphen_values = true, requires = "from_lon")]
        from_lat: Option<f64>,
        /// IANA timezone name to check
        #[arg(long)]
        timezone: Option<String>,
        /// Site listing (CSV or JSON) to search for nearby photometers
        #[arg(long)]
        sites: Option<PathBuf>,
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Check a site listing for duplicated, split or nearby locations
    Sites {
        path: PathBuf,
        /// Nearby radius in metres (default: enrich.nearby_distance_m)
        #[arg(long = "nearby-m")]
        nearby_m: Option<f64>,
        /// Write the flagged sites to this CSV file
        #[arg(long)]
        export: Option<PathBuf>,
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum VersionCmd {
    /// Close the Current record and open a new one at --at
    Open {
        #[arg(long)]
        store: String,
        #[arg(long)]
        mac: String,
        #[arg(long)]
        attribute: String,
        /// Name, `20.44[/filter]` or location id
        #[arg(long)]
        value: String,
        /// RFC 3339 instant; defaults to now
        #[arg(long)]
        at: Option<String>,
        #[arg(long, default_value_t = false)]
        live: bool,
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of an audit JSONL file
    Verify { path: PathBuf },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if absent; deployments inject env vars directly.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = tess_store::connect_from_env(tess_store::ENV_DB_URL).await?;
            match cmd {
                DbCmd::Status => {
                    let s = tess_store::status(&pool).await?;
                    println!("db_ok={} has_interval_table={}", s.ok, s.has_interval_table);
                }
                DbCmd::Migrate => {
                    tess_store::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            let loaded = tess_config::load_layered_yaml(&refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::History {
            store,
            mac,
            attribute,
            config_paths,
        } => commands::check::history(&store, &mac, &attribute, &config_paths).await?,

        Commands::Check {
            store,
            config_paths,
        } => commands::check::check(&store, &config_paths).await?,

        Commands::Normalize {
            store,
            live,
            config_paths,
        } => commands::check::normalize_store(&store, live, &config_paths).await?,

        Commands::Reconcile {
            relational,
            document,
            trust,
            tolerance_secs,
            live,
            report,
            config_paths,
        } => {
            commands::reconcile::reconcile(ReconcileArgs {
                relational: &relational,
                document: document.as_deref(),
                trust: trust.as_deref(),
                tolerance_secs,
                live,
                report: report.as_deref(),
                config: &config_paths,
            })
            .await?
        }

        Commands::Version {
            cmd:
                VersionCmd::Open {
                    store,
                    mac,
                    attribute,
                    value,
                    at,
                    live,
                    config_paths,
                },
        } => {
            commands::reconcile::version_open(VersionOpenArgs {
                store: &store,
                mac: &mac,
                attribute: &attribute,
                value: &value,
                at: at.as_deref(),
                live,
                config: &config_paths,
            })
            .await?
        }

        Commands::Locate {
            lon,
            lat,
            from_lon,
            from_lat,
            timezone,
            sites,
            config_paths,
        } => {
            commands::enrich::locate(LocateArgs {
                longitude: lon,
                latitude: lat,
                from: from_lon.zip(from_lat),
                timezone: timezone.as_deref(),
                sites: sites.as_deref(),
                config: &config_paths,
            })
            .await?
        }

        Commands::Sites {
            path,
            nearby_m,
            export,
            config_paths,
        } => commands::enrich::sites(SitesArgs {
            path: &path,
            nearby_m,
            export: export.as_deref(),
            config: &config_paths,
        })?,

        Commands::Audit {
            cmd: AuditCmd::Verify { path },
        } => match verify_hash_chain(&path)? {
            VerifyResult::Valid { lines } => {
                println!("audit_valid=true lines={lines}");
            }
            VerifyResult::Broken { line, reason } => {
                println!("audit_valid=false line={line} reason={reason}");
                anyhow::bail!("audit chain broken at line {line}");
            }
        },
    }

    Ok(())
}
