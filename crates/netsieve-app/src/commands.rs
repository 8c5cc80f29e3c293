//! Subcommand implementations.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use netsieve_core::{FilterConfig, FilterParameters, ObjectSummary, ParamKey, ProtocolObject};
use netsieve_engine::{EngineConfig, FilterEngine};
use netsieve_storage::{write_streams, ObjectLog};

fn load(path: &Path) -> Result<ObjectLog> {
    ObjectLog::load(path).with_context(|| format!("Failed to open object log {:?}", path))
}

fn stream_sizes(object: &ProtocolObject) -> String {
    let sizes: Vec<String> = object.streams().iter().map(|s| s.size().to_string()).collect();
    sizes.join("/")
}

pub fn dump(path: &Path, json: bool, out: &mut impl Write) -> Result<()> {
    let log = load(path)?;
    let mut count = 0usize;

    for record in log.records() {
        let record = record.context("Log is corrupt")?;
        let summary = ObjectSummary::of(&record.object);
        if json {
            let line = serde_json::json!({
                "offset": record.offset,
                "streams": record.object.streams().iter().map(|s| s.size()).collect::<Vec<_>>(),
                "summary": summary,
            });
            writeln!(out, "{}", line)?;
        } else {
            writeln!(
                out,
                "{:>10}  {:<28} [{}]  {}",
                record.offset,
                record.object.object_type(),
                stream_sizes(&record.object),
                summary
            )?;
        }
        count += 1;
    }

    tracing::info!("Listed {} records from {:?}", count, path);
    Ok(())
}

pub fn show(path: &Path, offset: u64, out: &mut impl Write) -> Result<()> {
    let log = load(path)?;
    let object = log
        .read(offset)
        .with_context(|| format!("No record at offset {}", offset))?;

    writeln!(out, "{}", ObjectSummary::of(&object))?;
    for (index, stream) in object.streams().iter().enumerate() {
        writeln!(out, "--- stream {} ({} bytes) ---", index, stream.size())?;
        writeln!(out, "{}", String::from_utf8_lossy(stream.as_bytes()))?;
    }
    Ok(())
}

pub fn export(path: &Path, offset: u64, dir: &Path) -> Result<PathBuf> {
    let log = load(path)?;
    let object = log
        .read(offset)
        .with_context(|| format!("No record at offset {}", offset))?;

    std::fs::create_dir_all(dir)?;
    let target = dir.join(format!("{}_{}.bin", offset, object.object_type()));
    write_streams(&target, &object)
        .with_context(|| format!("Failed to write {:?}", target))?;
    Ok(target)
}

/// Builds a parameter set from `key=value` pairs.
pub fn parse_params(pairs: &[String]) -> Result<FilterConfig> {
    let mut config = FilterConfig::default();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Expected KEY=VALUE, got {:?}", pair);
        };
        let key: ParamKey = key.trim().parse()?;
        config.set(key, key.parse_value(value)?)?;
    }
    Ok(config)
}

pub fn replay(
    path: &Path,
    config: FilterConfig,
    dest: Option<&Path>,
    out: &mut impl Write,
) -> Result<()> {
    let source = load(path)?;
    let target = match dest {
        Some(dest) => ObjectLog::open(dest)?,
        None => ObjectLog::in_memory(),
    };

    let posted = Arc::new(AtomicUsize::new(0));
    let posted_count = Arc::clone(&posted);
    let sink = move |_: u64, _: ProtocolObject| -> netsieve_engine::Result<()> {
        posted_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    };

    let engine = FilterEngine::new(
        FilterParameters::with_config(config),
        Arc::new(target),
        Arc::new(sink),
        EngineConfig::default(),
    );

    let mut total = 0usize;
    let mut blocked = 0usize;
    for record in source.records() {
        let record = record.context("Log is corrupt")?;
        let logged = engine.on_object(0, &record.object)?;
        total += 1;
        if logged.blocked {
            blocked += 1;
            let reason = logged.reason.map(|r| r.to_string()).unwrap_or_default();
            writeln!(out, "{:>10}  BLOCKED  {}  {}", record.offset, reason, logged.summary)?;
        }
    }

    writeln!(
        out,
        "{} objects replayed, {} blocked, {} posted",
        total,
        blocked,
        posted.load(Ordering::Relaxed)
    )?;
    Ok(())
}
