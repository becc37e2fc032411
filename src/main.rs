use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use prospect_sync::{
    CacheKey, Coordinate, EditSynchronizer, FieldPatch, ParentId, Prospect, ProspectId, QueueMode,
    SyncConfig, fields, ring_acres,
};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "prospect-sync")]
#[command(about = "Edit prospect records through the sync layer")]
struct Cli {
    /// Directory for local data; overrides PROSPECT_SYNC_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Namespace for local keys; overrides PROSPECT_SYNC_USER_ID
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a prospect
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "prospect")]
        status: String,
        #[arg(long)]
        follow_up: Option<String>,
        /// Group to link the new prospect to; repeatable
        #[arg(long)]
        group: Vec<String>,
    },
    /// List prospects, optionally for one group
    List {
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Print one prospect as JSON
    Show { id: String },
    /// Set one field; the value is parsed as JSON and falls back to a string
    Update {
        id: String,
        field: String,
        value: String,
    },
    /// Replace the polygon with the given `lng,lat` vertices
    Shape { id: String, vertices: Vec<String> },
    Delete { id: String },
    /// Area in acres of a ring of `lng,lat` vertices
    Area { vertices: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    if let Command::Area { vertices } = &cli.command {
        let ring = parse_ring(vertices)?;
        match ring_acres(&ring) {
            Some(acres) => println!("{acres}"),
            None => println!("ring has no area"),
        }
        return Ok(());
    }

    let mut config = SyncConfig::from_env().context("failed to load configuration")?;
    if let Some(dir) = cli.data_dir {
        config = config.data_dir(dir);
    } else if config.data_dir.is_none() {
        config = config.data_dir(".prospect-sync");
    }
    if let Some(user) = &cli.user {
        config = config.user_id(user);
    }

    let sync = EditSynchronizer::from_config(config).context("failed to compose synchronizer")?;
    info!(mode = ?sync.config().mode, "prospect-sync started");

    match cli.command {
        Command::Create {
            name,
            status,
            follow_up,
            group,
        } => {
            let mut payload = FieldPatch::new()
                .with(fields::NAME, Value::String(name))
                .with(fields::STATUS, Value::String(status));
            if let Some(timeframe) = follow_up {
                payload.set(fields::FOLLOW_UP_TIMEFRAME, Value::String(timeframe));
            }
            let groups = group.into_iter().map(ParentId::new).collect();
            let created = sync
                .create(payload, groups)
                .await
                .context("failed to create prospect")?;
            print_json(&created)?;
        }
        Command::List { group, status } => {
            let key = match group {
                Some(parent) => CacheKey::Group(ParentId::new(parent)),
                None => CacheKey::All,
            };
            let prospects = sync.load(key).await.context("failed to load prospects")?;
            for prospect in prospects
                .iter()
                .filter(|prospect| status.as_deref().is_none_or(|status| prospect.status == status))
            {
                println!("{}\t{}\t{}", prospect.id, prospect.status, prospect.name);
            }
        }
        Command::Show { id } => {
            let prospect = sync
                .dispatcher()
                .fetch(&ProspectId::new(id))
                .await
                .context("failed to read prospect")?;
            print_json(&prospect)?;
        }
        Command::Update { id, field, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            sync.select_by_id(&ProspectId::new(id))
                .await
                .context("failed to select prospect")?;
            let saved = sync
                .queue_update(&field, value, QueueMode::Immediate)
                .await
                .with_context(|| format!("failed to update {field}"))?;
            if let Some(saved) = saved {
                print_json(&saved)?;
            }
        }
        Command::Shape { id, vertices } => {
            let id = ProspectId::new(id);
            let ring = parse_ring(&vertices)?;
            let current = sync
                .dispatcher()
                .fetch(&id)
                .await
                .context("failed to read prospect")?;
            let snapshot = current
                .geometry
                .as_ref()
                .and_then(|geometry| geometry.outer_ring())
                .map(<[Coordinate]>::to_vec)
                .unwrap_or_default();

            let shapes = sync.shapes();
            shapes.begin(id, snapshot).await?;
            shapes.vertices_changed(ring)?;
            shapes.save().await.context("failed to save shape")?;
            let saved = sync.dispatcher().fetch(&current.id).await?;
            print_json(&saved)?;
        }
        Command::Delete { id } => {
            sync.delete(&ProspectId::new(id))
                .await
                .context("failed to delete prospect")?;
        }
        Command::Area { .. } => {}
    }

    sync.shutdown().await.context("failed to flush pending edits")?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("prospect_sync=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_ring(vertices: &[String]) -> Result<Vec<Coordinate>> {
    vertices
        .iter()
        .map(|vertex| {
            let (lng, lat) = vertex
                .split_once(',')
                .ok_or_else(|| anyhow!("vertex '{vertex}' must look like lng,lat"))?;
            let lng = lng.trim().parse().with_context(|| format!("bad longitude in '{vertex}'"))?;
            let lat = lat.trim().parse().with_context(|| format!("bad latitude in '{vertex}'"))?;
            Ok(Coordinate::new(lng, lat))
        })
        .collect()
}

fn print_json(prospect: &Prospect) -> Result<()> {
    let rendered = serde_json::to_string_pretty(prospect).context("failed to render prospect")?;
    println!("{rendered}");
    Ok(())
}
