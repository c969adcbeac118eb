//! Subcommand handlers

use crate::manifest;
use anyhow::{bail, Context};
use std::path::Path;
use voxgate_cache::{CacheReport, TieredCache};
use voxgate_foundation::{CacheKey, ConfigSource, VoxgateConfig};

async fn open_cache(config: &VoxgateConfig) -> anyhow::Result<TieredCache> {
    TieredCache::from_config(config.cache.clone())
        .await
        .context("Failed to open audio cache")
}

/// Print the effective configuration
pub fn show_config(config: &VoxgateConfig, source: &ConfigSource) -> anyhow::Result<()> {
    match source {
        ConfigSource::File(path) => eprintln!("# loaded from {}", path.display()),
        ConfigSource::Defaults => eprintln!("# no config file found, using defaults"),
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

pub fn save_config(config: &VoxgateConfig, global: bool) -> anyhow::Result<()> {
    if global {
        config.save_global().context("Failed to save global config")?;
    } else {
        config.save_project().context("Failed to save project config")?;
    }
    eprintln!("✓ configuration saved");
    Ok(())
}

pub async fn stats(config: &VoxgateConfig, json: bool) -> anyhow::Result<()> {
    let cache = open_cache(config).await?;
    let report = cache.comprehensive_stats().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &CacheReport) {
    println!("\nAudio Cache\n");
    println!(
        "{:<12} {:>10} {:>14} {:>12} {:>10} {:>10}",
        "Tier", "Entries", "Bytes", "Evictions", "Expired", "Usage"
    );
    println!("{}", "-".repeat(72));

    for tier in &report.tiers {
        match &tier.backend {
            Some(stats) => println!(
                "{:<12} {:>10} {:>14} {:>12} {:>10} {:>9.1}%",
                tier.tier.as_str(),
                stats.entries,
                stats.total_bytes,
                stats.evictions,
                stats.expirations,
                stats.memory_utilization() * 100.0
            ),
            None => println!("{:<12} {:>10}", tier.tier.as_str(), "unavailable"),
        }
    }

    println!("\nTotal entries: {}", report.total_entries());
}

pub async fn get(config: &VoxgateConfig, text: &str, out: Option<&Path>) -> anyhow::Result<()> {
    let cache = open_cache(config).await?;
    let key = CacheKey::from_text(text);

    let Some(audio) = cache.get_by_key(&key).await else {
        bail!("No cached audio for {}", key.short());
    };

    match out {
        Some(path) => {
            std::fs::write(path, &audio[..])
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✓ {} bytes -> {}", audio.len(), path.display());
        }
        None => println!("✓ hit {} ({} bytes)", key, audio.len()),
    }
    Ok(())
}

pub async fn put(config: &VoxgateConfig, text: &str, file: &Path) -> anyhow::Result<()> {
    let audio =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let size = audio.len();

    let cache = open_cache(config).await?;
    let key = cache.put(text, audio).await;
    if !cache.has(text).await {
        bail!("No tier accepted the entry ({} bytes)", size);
    }
    println!("✓ stored {} ({} bytes)", key, size);
    Ok(())
}

pub async fn warm(config: &VoxgateConfig, manifest_path: &Path) -> anyhow::Result<()> {
    let entries = manifest::load(manifest_path)?;
    let total = entries.len();

    let mut pairs = Vec::with_capacity(total);
    for entry in entries {
        match std::fs::read(&entry.path) {
            Ok(audio) => pairs.push((entry.text, audio)),
            Err(e) => eprintln!("✗ {}: {}", entry.path.display(), e),
        }
    }

    let cache = open_cache(config).await?;
    let warmed = cache.warm(pairs).await;
    println!("✓ warmed {}/{} entries", warmed, total);
    Ok(())
}

pub async fn cleanup(config: &VoxgateConfig) -> anyhow::Result<()> {
    let cache = open_cache(config).await?;
    let report = cache.cleanup_expired().await;

    for (tier, removed) in &report.per_tier {
        println!("{:<12} {:>8} removed", tier.as_str(), removed);
    }
    for tier in &report.failed_tiers {
        eprintln!("✗ {} sweep failed", tier);
    }
    println!("✓ {} expired entries removed", report.removed);
    Ok(())
}

pub async fn clear(config: &VoxgateConfig) -> anyhow::Result<()> {
    let cache = open_cache(config).await?;
    cache.clear().await;
    println!("✓ cache cleared");
    Ok(())
}
