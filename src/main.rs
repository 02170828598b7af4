/// Keep-alive inspection tool
/// Prints the loaded-region records persisted for one world
///
/// Usage: region-keepalive <config.toml> [world-id]

use anyhow::{bail, Context, Result};

use region_keepalive::{DurableStore, FileStore, KeepaliveConfig, RegionSerializer, WorldId};

const DEFAULT_WORLD: &str = "world:overworld";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        bail!("usage: region-keepalive <config.toml> [world-id]");
    };
    let world_arg = args.next().unwrap_or_else(|| DEFAULT_WORLD.to_string());

    let config = KeepaliveConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path))?;
    let world = WorldId::parse(&world_arg)?;
    let store = FileStore::new(&config.save_dir)
        .with_context(|| format!("opening save directory {}", config.save_dir.display()))?;

    log::info!(
        "Reading {} for {} from {}",
        config.storage_key,
        world,
        store.path_for(&world, &config.storage_key).display()
    );

    let Some(data) = store.load(&world, &config.storage_key)? else {
        println!("{}: no keep-alive records stored", world);
        return Ok(());
    };

    let records = RegionSerializer::new()
        .deserialize(&data)
        .with_context(|| format!("decoding keep-alive records for {}", world))?;

    println!("{}: {} loaded regions", world, records.len());
    for record in &records {
        println!(
            "  region {} held by loader {} (requested by {})",
            record.region(),
            record.loader(),
            record.requested_by()
        );
    }

    Ok(())
}
