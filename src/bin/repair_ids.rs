use anyhow::{anyhow, Context};
use product_catalog::infra::config::{ServerConfig, StorageBackend};
use product_catalog::infra::logging::init_tracing;
use product_catalog::PgProductStore;
use product_catalog::ProductStore;

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: cargo run --bin repair_ids -- --confirm\n\
         \n\
         Renumbers every product densely from 0 (oldest first) and resets the\n\
         product id counter. Requires env vars:\n\
           DATABASE_URL\n"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        usage_and_exit();
    }
    if !args.iter().any(|a| a == "--confirm") {
        eprintln!("Refusing to renumber products without --confirm.\n");
        usage_and_exit();
    }

    let config = ServerConfig::from_env().context("invalid configuration")?;
    let database_url = match config.storage {
        StorageBackend::Postgres { database_url } => database_url,
        StorageBackend::Memory => {
            return Err(anyhow!("repair_ids needs STORAGE_BACKEND=postgres (the memory store has nothing to repair)"))
        }
    };

    let store = PgProductStore::connect(&database_url)
        .await
        .context("could not connect to the database")?;
    let before = store.counter_value().await?;
    let report = store.repair_ids().await?;

    println!("> Repair complete:");
    println!("  products:        {}", report.total);
    println!("  ids changed:     {}", report.changed);
    println!("  counter before:  {}", before);
    println!("  counter after:   {}", report.counter);
    Ok(())
}
