//! CLI command implementations

use crate::output::{format_offset, format_rows, to_json, OutputFormat, PositionRow, QualityRow};
use crate::player::HeadlessEngine;
use anyhow::Context;
use seekwell_core::quality::check_permission;
use seekwell_core::{
    CoreConfig, DescriptorProvider, HttpDescriptorProvider, LoadOptions, PlayableRequest,
    PlaybackOrchestrator, PositionStore, QualityCatalog, QualityId, QualityPermission,
    RenderingEngine, SwitchOutcome, VideoId,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

fn access_label(permission: &QualityPermission) -> String {
    match permission {
        QualityPermission::Permitted => "ok".to_string(),
        QualityPermission::RequiresLogin { .. } => "login required".to_string(),
        QualityPermission::RequiresPremium { .. } => "premium required".to_string(),
    }
}

/// Fetch and print the quality catalog for a video
pub async fn qualities(config: &CoreConfig, video_id: &str, format: &str) -> anyhow::Result<()> {
    let provider = HttpDescriptorProvider::new(&config.provider)?;
    let id = VideoId::from(video_id);
    let response = provider
        .fetch_descriptors(&id, None)
        .await
        .with_context(|| format!("fetching descriptors for {}", id))?;
    let catalog = QualityCatalog::from_response(id, response);

    let tier = config.playback.account_tier;
    let rows: Vec<QualityRow> = catalog
        .options()
        .into_iter()
        .map(|o| QualityRow {
            id: o.id.value(),
            label: o.label,
            entitled: o.entitled,
            cached: o.cached,
            access: access_label(&check_permission(o.id, tier)),
        })
        .collect();

    if let Some(rendered) = format_rows(&rows, OutputFormat::from(format)) {
        println!("{}", rendered);
        return Ok(());
    }

    println!("Qualities for {}:", catalog.video_id());
    if !catalog.metadata().title.is_empty() {
        println!("  Title: {}", catalog.metadata().title);
    }
    if let Some(duration) = catalog.metadata().duration_ms {
        println!("  Duration: {}", format_offset(duration));
    }
    println!();
    for row in &rows {
        println!(
            "  {:>4}  {:<14} {}{}  [{}]",
            row.id,
            row.label,
            if row.entitled { "entitled" } else { "-" },
            if row.cached { ", cached" } else { "" },
            row.access
        );
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct SwitchReport {
    outcome: String,
    quality: Option<u32>,
    label: Option<String>,
    was_fallback: bool,
}

impl From<&SwitchOutcome> for SwitchReport {
    fn from(outcome: &SwitchOutcome) -> Self {
        match outcome {
            SwitchOutcome::Switched {
                quality,
                was_fallback,
                label,
                ..
            } => SwitchReport {
                outcome: "switched".into(),
                quality: Some(quality.value()),
                label: Some(label.clone()),
                was_fallback: *was_fallback,
            },
            other => SwitchReport {
                outcome: match other {
                    SwitchOutcome::AlreadyCurrent => "already_current".into(),
                    SwitchOutcome::Unavailable => "unavailable".into(),
                    SwitchOutcome::Failed(err) => format!("failed: {}", err),
                    SwitchOutcome::Superseded => "superseded".into(),
                    _ => "not_playing".into(),
                },
                quality: None,
                label: None,
                was_fallback: false,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct PlayReport {
    video_id: String,
    title: String,
    requested_quality: u32,
    quality: u32,
    was_fallback: bool,
    resume_offset_ms: u64,
    request: PlayableRequest,
    switch: Option<SwitchReport>,
    final_position_ms: i64,
}

/// Load a video through the headless engine, optionally switch quality,
/// then play for `watch_secs` while saving positions
pub async fn play(
    config: &CoreConfig,
    video_id: &str,
    quality: Option<u32>,
    force: bool,
    watch_secs: u64,
    format: &str,
) -> anyhow::Result<()> {
    let provider = Arc::new(HttpDescriptorProvider::new(&config.provider)?);
    let engine = Arc::new(HeadlessEngine::new());
    let positions = PositionStore::open_file(&config.positions).await;
    let orchestrator =
        PlaybackOrchestrator::new(provider, engine.clone(), positions, config.clone());

    let id = VideoId::from(video_id);
    let options = LoadOptions {
        force,
        preferred_quality: None,
    };

    let loaded = match orchestrator.load_with(&id, options).await {
        Ok(loaded) => loaded,
        Err(err) => {
            if err.requires_force() {
                eprintln!("Hint: retry with --force to bypass the cooldown");
            }
            orchestrator.shutdown().await;
            return Err(anyhow::Error::new(err).context(format!("loading {} failed", id)));
        }
    };
    engine.set_duration(loaded.metadata.duration_ms);

    let switch = match quality {
        Some(q) => Some(orchestrator.switch_quality(QualityId(q)).await),
        None => None,
    };

    if watch_secs > 0 {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        for _ in 0..watch_secs {
            ticker.tick().await;
            orchestrator.report_position_tick().await;
        }
    }

    let final_position_ms = engine.current_position_ms();
    orchestrator.on_leave(&id).await;
    orchestrator.shutdown().await;

    let report = PlayReport {
        video_id: loaded.video_id.to_string(),
        title: loaded.metadata.title.clone(),
        requested_quality: loaded.requested_quality.value(),
        quality: loaded.quality.value(),
        was_fallback: loaded.was_fallback,
        resume_offset_ms: loaded.resume_offset_ms,
        request: engine.current_request().unwrap_or(loaded.request),
        switch: switch.as_ref().map(SwitchReport::from),
        final_position_ms,
    };

    if OutputFormat::from(format) == OutputFormat::Json {
        println!("{}", to_json(&report));
        return Ok(());
    }

    println!("Played {} {}", report.video_id, report.title);
    println!(
        "  Loaded at: {}{}",
        report.quality,
        if report.was_fallback {
            format!(" (requested {})", report.requested_quality)
        } else {
            String::new()
        }
    );
    if report.resume_offset_ms > 0 {
        println!("  Resumed from: {}", format_offset(report.resume_offset_ms));
    }
    if let Some(switch) = &report.switch {
        match (&switch.label, switch.quality) {
            (Some(label), Some(q)) => println!(
                "  Switched to: {} ({}){}",
                label,
                q,
                if switch.was_fallback { " [server fallback]" } else { "" }
            ),
            _ => println!("  Switch: {}", switch.outcome),
        }
    }
    println!("  Video: {}", report.request.video_url);
    if let Some(audio) = &report.request.audio_url {
        println!("  Audio: {}", audio);
    }
    for backup in &report.request.video_backup_urls {
        println!("  Backup: {}", backup);
    }
    println!("  Stopped at: {}", format_offset(report.final_position_ms.max(0) as u64));

    Ok(())
}

fn position_row(entry: seekwell_core::PositionEntry) -> PositionRow {
    PositionRow {
        video_id: entry.id.to_string(),
        position: format_offset(entry.offset_ms),
        offset_ms: entry.offset_ms,
        updated_at: entry.updated_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    }
}

/// List remembered positions, most recent first
pub async fn positions_list(config: &CoreConfig, format: &str) -> anyhow::Result<()> {
    let store = PositionStore::open_file(&config.positions).await;
    let rows: Vec<PositionRow> = store
        .entries()
        .await
        .into_iter()
        .rev()
        .map(position_row)
        .collect();
    store.shutdown().await;

    if let Some(rendered) = format_rows(&rows, OutputFormat::from(format)) {
        println!("{}", rendered);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No saved positions");
        return Ok(());
    }
    println!("Saved positions ({}):", rows.len());
    for row in &rows {
        println!("  {:<24} {:>10}  {}", row.video_id, row.position, row.updated_at);
    }
    Ok(())
}

pub async fn positions_get(
    config: &CoreConfig,
    video_id: &str,
    format: &str,
) -> anyhow::Result<()> {
    let store = PositionStore::open_file(&config.positions).await;
    let offset = store.get(&VideoId::from(video_id)).await;
    store.shutdown().await;

    if OutputFormat::from(format) == OutputFormat::Json {
        println!("{}", to_json(&serde_json::json!({ "video_id": video_id, "offset_ms": offset })));
    } else if offset == 0 {
        println!("{}: no saved position", video_id);
    } else {
        println!("{}: {} ({} ms)", video_id, format_offset(offset), offset);
    }
    Ok(())
}

pub async fn positions_set(
    config: &CoreConfig,
    video_id: &str,
    offset_ms: i64,
    duration_ms: Option<i64>,
) -> anyhow::Result<()> {
    let store = PositionStore::open_file(&config.positions).await;
    let recorded = store
        .put(&VideoId::from(video_id), offset_ms, duration_ms.unwrap_or(offset_ms))
        .await;
    store.shutdown().await;

    if !recorded {
        anyhow::bail!("position not recorded: offset and duration must be positive");
    }
    println!("{}: saved {}", video_id, format_offset(offset_ms as u64));
    Ok(())
}

pub async fn positions_remove(config: &CoreConfig, video_id: &str) -> anyhow::Result<()> {
    let store = PositionStore::open_file(&config.positions).await;
    let removed = store.remove(&VideoId::from(video_id)).await;
    store.shutdown().await;

    if removed {
        println!("{}: removed", video_id);
    } else {
        println!("{}: no saved position", video_id);
    }
    Ok(())
}

pub async fn positions_clear(config: &CoreConfig) -> anyhow::Result<()> {
    let store = PositionStore::open_file(&config.positions).await;
    let count = store.len().await;
    store.clear().await;
    store.shutdown().await;
    println!("Cleared {} saved positions", count);
    Ok(())
}

/// Print the effective configuration
pub fn show_config(config: &CoreConfig, format: &str) -> anyhow::Result<()> {
    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", to_json(config)),
        _ => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}
