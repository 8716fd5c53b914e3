mod cli;

use anyhow::{bail, Context};
use clap::ArgMatches;
use log::{info, warn};
use std::sync::Arc;
use vectorify::types::{QueryObject, UpsertObject};
use vectorify::{CancellationToken, Client, Config, FileStore, InMemoryStore, RateLimitStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::build_cli();
    let matches = cmd.get_matches();
    let log_level = matches.get_one::<String>("log-level").cloned();
    let version_flag = matches.get_flag("version");

    cli::init_logging(log_level.as_deref());

    if version_flag {
        println!("vectorify {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let Some((name, sub)) = matches.subcommand() else {
        bail!("no command given; see --help");
    };

    let config = Config::from_env()?;
    let store: Arc<dyn RateLimitStore> = match &config.state_dir {
        Some(dir) => {
            let files = FileStore::new(dir);
            info!("Sharing rate limit state via {}", files.dir().display());
            Arc::new(files)
        }
        None => Arc::new(InMemoryStore::new()),
    };
    let client = Client::new(config, Some(store))?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling request");
            trigger.cancel();
        }
    });

    run(name, sub, &client, &cancel).await
}

async fn run(
    name: &str,
    args: &ArgMatches,
    client: &Client,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match name {
        "query" => {
            let mut query = QueryObject::new(
                args.get_one::<String>("text")
                    .cloned()
                    .unwrap_or_default(),
            );
            query.collections = args
                .get_many::<String>("collection")
                .map(|c| c.cloned().collect());
            query.tenant = args.get_one::<i64>("tenant").copied();
            let Some(result) = client.query_with_cancel(&query, cancel).await? else {
                bail!("query rejected by the API");
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "upsert" => {
            let path = args
                .get_one::<String>("file")
                .context("--file is required")?;
            let raw = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {path}"))?;
            let object: UpsertObject =
                serde_json::from_slice(&raw).with_context(|| format!("parsing {path}"))?;
            if client.upsert_with_cancel(&object, cancel).await? {
                println!("accepted");
            } else {
                println!("rejected");
                bail!("upsert rejected by the API");
            }
        }
        "list" => {
            let items = client.list_upserts_with_cancel(cancel).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        "fetch" => {
            let id = args.get_one::<String>("id").context("id is required")?;
            let Some(item) = client.fetch_upsert_with_cancel(id, cancel).await? else {
                bail!("upsert {id} not found");
            };
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        other => bail!("unknown command: {other}"),
    }
    Ok(())
}
