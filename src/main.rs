mod cli;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use kydras_storage::disk::{DeviceClass, Tier};
use kydras_storage::pool::PoolKind;
use kydras_storage::rules::PoolRule;
use kydras_storage::{EngineConfig, StorageEngine};
use serde_json::json;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let json_output = cli.json;
    let engine = StorageEngine::new(EngineConfig::production())
        .context("failed to open the metadata index")?;

    match cli.command {
        Commands::CreatePool { name, kind, drives } => cmd_create_pool(&engine, &name, &kind, drives, json_output),
        Commands::AddDrive { pool, root, label, class } => {
            cmd_add_drive(&engine, &pool, root, &label, &class, json_output)
        }
        Commands::RemoveDrive { pool, label } => cmd_remove_drive(&engine, &pool, &label, json_output),
        Commands::AddRule { pool, pattern, duplication, target_drive, prefer_ssd, max_size_bytes, tier } => {
            cmd_add_rule(&engine, &pool, pattern, duplication, target_drive, prefer_ssd, max_size_bytes, tier, json_output)
        }
        Commands::ListPools => cmd_list_pools(&engine, json_output),
        Commands::ShowPool { pool } => cmd_show_pool(&engine, &pool, json_output),
        Commands::Write { pool, rel_path, source } => cmd_write(&engine, &pool, &rel_path, &source, json_output),
        Commands::Read { pool, rel_path, dest } => cmd_read(&engine, &pool, &rel_path, dest, json_output),
        Commands::Delete { pool, rel_path } => cmd_delete(&engine, &pool, &rel_path, json_output),
        Commands::Exists { pool, rel_path } => cmd_exists(&engine, &pool, &rel_path, json_output),
        Commands::List { pool, pattern } => cmd_list(&engine, &pool, &pattern, json_output),
        Commands::Rebalance { pool } => cmd_rebalance(&engine, &pool, json_output),
        Commands::CheckHealth { root } => cmd_check_health(&engine, &root, json_output),
    }
}

fn parse_pool_kind(kind: &str) -> Result<PoolKind> {
    match kind.to_lowercase().as_str() {
        "jbod" => Ok(PoolKind::Jbod),
        "mirror" => Ok(PoolKind::Mirror),
        "performance" => Ok(PoolKind::Performance),
        "archive" => Ok(PoolKind::Archive),
        "custom" => Ok(PoolKind::Custom),
        other => Err(anyhow!("unknown pool kind '{}' (expected jbod|mirror|performance|archive|custom)", other)),
    }
}

fn parse_device_class(class: &str) -> Result<DeviceClass> {
    match class.to_lowercase().as_str() {
        "hdd" => Ok(DeviceClass::Hdd),
        "ssd" => Ok(DeviceClass::Ssd),
        "nvme" => Ok(DeviceClass::Nvme),
        "network" => Ok(DeviceClass::Network),
        "removable" => Ok(DeviceClass::Removable),
        other => Err(anyhow!("unknown device class '{}' (expected hdd|ssd|nvme|network|removable)", other)),
    }
}

fn parse_tier(tier: &str) -> Result<Tier> {
    match tier.to_lowercase().as_str() {
        "hot" => Ok(Tier::Hot),
        "warm" => Ok(Tier::Warm),
        "cold" => Ok(Tier::Cold),
        other => Err(anyhow!("unknown tier '{}' (expected hot|warm|cold)", other)),
    }
}

fn parse_pool_id(pool: &str) -> Result<Uuid> {
    Uuid::parse_str(pool).with_context(|| format!("'{}' is not a valid pool id", pool))
}

fn cmd_create_pool(engine: &StorageEngine, name: &str, kind: &str, drives: Vec<PathBuf>, json_output: bool) -> Result<()> {
    let kind = parse_pool_kind(kind)?;
    let pool_id = engine.create_pool(name, &drives, kind).map_err(|e| anyhow!(e))?;

    if json_output {
        println!("{}", json!({ "pool_id": pool_id.to_string(), "name": name }));
    } else {
        println!("created pool '{}' ({})", name, pool_id);
    }
    Ok(())
}

fn cmd_add_drive(engine: &StorageEngine, pool: &str, root: PathBuf, label: &str, class: &str, json_output: bool) -> Result<()> {
    let pool_id = parse_pool_id(pool)?;
    let class = parse_device_class(class)?;
    engine.add_drive(pool_id, root.clone(), label, class).map_err(|e| anyhow!(e))?;

    if json_output {
        println!("{}", json!({ "status": "ok", "drive": label, "root": root.display().to_string() }));
    } else {
        println!("added drive '{}' at {} to pool {}", label, root.display(), pool_id);
    }
    Ok(())
}

fn cmd_remove_drive(engine: &StorageEngine, pool: &str, label: &str, json_output: bool) -> Result<()> {
    let pool_id = parse_pool_id(pool)?;
    engine.remove_drive(pool_id, label).map_err(|e| anyhow!(e))?;

    if json_output {
        println!("{}", json!({ "status": "ok", "drive": label }));
    } else {
        println!("removed drive '{}' from pool {} (files left in place)", label, pool_id);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_add_rule(
    engine: &StorageEngine,
    pool: &str,
    pattern: String,
    duplication: usize,
    target_drive: Option<String>,
    prefer_ssd: bool,
    max_size_bytes: Option<u64>,
    tier: Option<String>,
    json_output: bool,
) -> Result<()> {
    let pool_id = parse_pool_id(pool)?;
    let mut rule = PoolRule::new(pattern.clone()).with_duplication(duplication).with_prefer_ssd(prefer_ssd);
    if let Some(label) = target_drive {
        rule = rule.with_target_drive(label);
    }
    if let Some(max) = max_size_bytes {
        rule = rule.with_max_size_bytes(max);
    }
    if let Some(tier) = tier {
        rule = rule.with_preferred_tier(parse_tier(&tier)?);
    }

    engine.add_rule(pool_id, rule).map_err(|e| anyhow!(e))?;

    if json_output {
        println!("{}", json!({ "status": "ok", "pattern": pattern, "duplication": duplication }));
    } else {
        println!("added rule '{}' (duplication {}) to pool {}", pattern, duplication, pool_id);
    }
    Ok(())
}

fn cmd_list_pools(engine: &StorageEngine, json_output: bool) -> Result<()> {
    let pools = engine.list_pools();

    if json_output {
        let entries: Vec<_> = pools
            .iter()
            .map(|p| json!({ "id": p.id.to_string(), "name": p.name, "drives": p.drives.len(), "rules": p.rules.len() }))
            .collect();
        println!("{}", json!({ "pools": entries }));
    } else if pools.is_empty() {
        println!("no pools");
    } else {
        for p in &pools {
            println!("{}  {}  drives={}  rules={}", p.id, p.name, p.drives.len(), p.rules.len());
        }
    }
    Ok(())
}

fn cmd_show_pool(engine: &StorageEngine, pool: &str, json_output: bool) -> Result<()> {
    let pool_id = parse_pool_id(pool)?;
    let pool = engine.get_pool(pool_id).map_err(|e| anyhow!(e))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&pool)?);
    } else {
        println!("pool {} ({:?})", pool.name, pool.kind);
        println!("  mount hint: {}", pool.mount_point_hint.as_deref().unwrap_or("-"));
        println!("  drives:");
        for d in &pool.drives {
            println!(
                "    {:<12} {:<10} {:?}  free={}/{}",
                d.label,
                format!("{:?}", d.device_class),
                d.health,
                d.free_bytes,
                d.total_bytes
            );
        }
        println!("  rules:");
        for r in &pool.rules {
            println!("    {:<20} dup={} ssd={} tier={:?}", r.pattern, r.duplication, r.prefer_ssd, r.preferred_tier);
        }
    }
    Ok(())
}

fn cmd_write(engine: &StorageEngine, pool: &str, rel_path: &str, source: &Path, json_output: bool) -> Result<()> {
    let pool_id = parse_pool_id(pool)?;
    let mut data = Vec::new();
    std::fs::File::open(source)
        .with_context(|| format!("opening {}", source.display()))?
        .read_to_end(&mut data)?;

    let mut cursor = Cursor::new(data);
    engine.write(pool_id, rel_path, &mut cursor).map_err(|e| anyhow!(e))?;

    if json_output {
        println!("{}", json!({ "status": "ok", "rel_path": rel_path }));
    } else {
        println!("wrote {} into pool {}", rel_path, pool_id);
    }
    Ok(())
}

fn cmd_read(engine: &StorageEngine, pool: &str, rel_path: &str, dest: Option<PathBuf>, json_output: bool) -> Result<()> {
    let pool_id = parse_pool_id(pool)?;
    let data = engine.read(pool_id, rel_path).map_err(|e| anyhow!(e))?;

    match dest {
        Some(path) => {
            std::fs::write(&path, &data).with_context(|| format!("writing {}", path.display()))?;
            if json_output {
                println!("{}", json!({ "status": "ok", "bytes": data.len(), "dest": path.display().to_string() }));
            } else {
                println!("wrote {} bytes to {}", data.len(), path.display());
            }
        }
        None => {
            if json_output {
                println!("{}", json!({ "status": "ok", "bytes": data.len() }));
            } else {
                std::io::stdout().write_all(&data)?;
            }
        }
    }
    Ok(())
}

fn cmd_delete(engine: &StorageEngine, pool: &str, rel_path: &str, json_output: bool) -> Result<()> {
    let pool_id = parse_pool_id(pool)?;
    engine.delete(pool_id, rel_path).map_err(|e| anyhow!(e))?;

    if json_output {
        println!("{}", json!({ "status": "ok", "rel_path": rel_path }));
    } else {
        println!("deleted {} from pool {}", rel_path, pool_id);
    }
    Ok(())
}

fn cmd_exists(engine: &StorageEngine, pool: &str, rel_path: &str, json_output: bool) -> Result<()> {
    let pool_id = parse_pool_id(pool)?;
    let exists = engine.exists(pool_id, rel_path).map_err(|e| anyhow!(e))?;

    if json_output {
        println!("{}", json!({ "exists": exists }));
    } else {
        println!("{}", exists);
    }
    Ok(())
}

fn cmd_list(engine: &StorageEngine, pool: &str, pattern: &str, json_output: bool) -> Result<()> {
    let pool_id = parse_pool_id(pool)?;
    let entries = engine.list(pool_id, pattern).map_err(|e| anyhow!(e))?;

    if json_output {
        println!("{}", json!({ "entries": entries }));
    } else {
        for e in &entries {
            println!("{e}");
        }
    }
    Ok(())
}

fn cmd_rebalance(engine: &StorageEngine, pool: &str, json_output: bool) -> Result<()> {
    let pool_id = parse_pool_id(pool)?;
    let report = engine.rebalance(pool_id).map_err(|e| anyhow!(e))?;

    if json_output {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(
            "rebalance of pool {}: {} file(s) considered, {} replica(s) added, {} evicted, {} orphan(s) removed",
            pool_id, report.files_considered, report.replicas_added, report.replicas_evicted, report.orphans_removed
        );
    }
    Ok(())
}

fn cmd_check_health(engine: &StorageEngine, root: &Path, json_output: bool) -> Result<()> {
    let health = engine.check_drive_health(root);

    if json_output {
        println!(
            "{}",
            json!({ "state": format!("{:?}", health.state), "total_bytes": health.total_bytes, "free_bytes": health.free_bytes })
        );
    } else {
        println!("{:?}  free={}/{}", health.state, health.free_bytes, health.total_bytes);
    }
    Ok(())
}
