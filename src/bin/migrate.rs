use anyhow::Result;
use erc20_watcher::config::Config;
use erc20_watcher::repository::Database;

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = Config::from_env()?;
    let database_path = config.database_path();

    println!("Running migrations on database: {}", database_path.display());

    let _db = Database::new(&database_path.to_string_lossy())?;

    println!("Migrations completed successfully!");

    Ok(())
}
