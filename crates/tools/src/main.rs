use std::path::PathBuf;
use std::sync::Arc;

use app::{Application, FetchShareService, RecordingMapEngine, StartOptions};
use catalog::{CatalogContext, DEFINITION, InMemorySettingsStore, Model, ModelKind, load_map_items};
use clap::{Parser, Subcommand};
use foundation::ModelId;
use serde_json::Value;
use streaming::{DefaultFetcher, Fetcher, HttpFetcher};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod report;

use report::{StateReport, TableReport};

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline driver for the atlas catalog core")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an application from a config and print the resulting state
    Start {
        /// Config document URL or path
        #[arg(long)]
        config: String,

        /// Application URL whose hash is interpreted after startup
        #[arg(long)]
        url: Option<String>,

        /// Base URL of the share service
        #[arg(long)]
        share_url: Option<String>,

        /// Persisted setting as KEY=VALUE (repeatable)
        #[arg(long = "setting")]
        settings: Vec<String>,
    },

    /// Load a CSV as a table item and print its classification
    Classify {
        /// CSV file
        #[arg(long)]
        csv: PathBuf,

        /// JSON file with extra traits (styles, defaultStyle, activeStyle, columns, ...)
        #[arg(long)]
        traits: Option<PathBuf>,

        /// Region mapping document URL or path
        #[arg(long)]
        region_mapping: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let fetcher: Arc<dyn Fetcher> = Arc::new(DefaultFetcher::new(HttpFetcher::new()));

    match args.command {
        Command::Start {
            config,
            url,
            share_url,
            settings,
        } => {
            let mut store = InMemorySettingsStore::new();
            for setting in settings {
                let (key, value) = setting
                    .split_once('=')
                    .ok_or_else(|| format!("--setting expects KEY=VALUE, got `{setting}`"))?;
                store = store.with(key, value);
            }
            let app = Application::new(
                Arc::clone(&fetcher),
                Arc::new(RecordingMapEngine::new()),
                Box::new(store),
            );
            let mut options = StartOptions::new(config);
            if let Some(url) = url {
                options = options.with_application_url(url);
            }
            if let Some(share_url) = share_url {
                options = options
                    .with_share_data_service(Arc::new(FetchShareService::new(fetcher, share_url)));
            }
            app.start(options).await;
            info!(phase = ?app.phase(), "application started");
            println!(
                "{}",
                serde_json::to_string_pretty(&StateReport::from_application(&app))?
            );
        }
        Command::Classify {
            csv,
            traits,
            region_mapping,
        } => {
            let ctx = CatalogContext::new(fetcher);
            ctx.set_region_mapping_url(region_mapping);

            let mut model = Model::new(ModelId::new("csv"), ModelKind::Csv);
            let text = tokio::fs::read_to_string(&csv).await?;
            model
                .strata
                .set_trait(DEFINITION, "csvString", Value::String(text));
            if let Some(path) = traits {
                let raw = tokio::fs::read_to_string(&path).await?;
                match serde_json::from_str::<Value>(&raw)? {
                    Value::Object(traits) => {
                        for (key, value) in traits {
                            model.strata.set_trait(DEFINITION, &key, value);
                        }
                    }
                    _ => {
                        let message = format!("{}: traits must be a JSON object", path.display());
                        return Err(message.into());
                    }
                }
            }
            ctx.update(|registry| registry.add_model(model))?;
            load_map_items(&ctx, "csv").await?;

            let report = TableReport::from_model(&ctx, "csv").ok_or("table was not produced")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
