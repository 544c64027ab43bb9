// Nutrition tracker guided-tour engine
// Main library entry point

pub mod geometry;
pub mod host;
pub mod measure;
pub mod models;
pub mod persistence;
pub mod settings;
pub mod sim;
pub mod smoke;
pub mod tour;
pub mod tui;
pub mod utils;

use anyhow::Context;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::screen::{Screen, ONBOARDING_ORDER};
use crate::persistence::memory::MemoryFlagStore;
use crate::persistence::{FlagStore, UserId};
use crate::settings::TourSettings;
use crate::tour::gate::PersistenceGate;

const DEFAULT_SMOKE_USER: &str = "smoke-user";

/// Initialize logging system with dual format (JSON + human-readable)
fn init_logging(with_stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = utils::path_resolver::resolve_log_folder()?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");
    let json_log_file = log_dir.join(format!("tour-{}.log", timestamp));
    let txt_log_file = log_dir.join(format!("tour-{}.txt", timestamp));

    // - JSON format to .log file
    // - Human-readable format to .txt file
    // - Optional: human-readable to stdout (off when the output itself is the product, e.g. previews)
    let mut dispatch = fern::Dispatch::new().level(log::LevelFilter::Debug);

    if with_stdout {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .level(log::LevelFilter::Info)
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(std::io::stdout()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", txt_line));
                })
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch.apply()?;

    log::info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}

/// Run `fut` on a fresh current-thread runtime; log and exit(1) on failure.
fn block_on_or_exit<F>(phase: &str, fut: F)
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build();
    let result = match rt {
        Ok(rt) => rt.block_on(fut),
        Err(e) => Err(anyhow::anyhow!(
            "Failed to create async runtime for {}: {}",
            phase,
            e
        )),
    };

    if let Err(e) = result {
        error!("[PHASE: {}] [STEP: exit] Exited with error: {:?}", phase, e);
        eprintln!("Tour engine error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_settings(config: Option<&Path>) -> TourSettings {
    match TourSettings::load(config) {
        Ok(settings) => {
            info!(
                "[PHASE: initialization] [STEP: config] Settings loaded (backend={:?}, retries={}, top_inset={})",
                settings.store.backend, settings.measure_retries, settings.top_inset
            );
            settings
        }
        Err(e) => {
            error!(
                "[PHASE: initialization] [STEP: config] Invalid configuration: {:?}",
                e
            );
            eprintln!("Tour engine error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn parse_user(user: Option<String>) -> anyhow::Result<UserId> {
    let raw = user.unwrap_or_else(|| DEFAULT_SMOKE_USER.to_string());
    utils::validation::validate_user_id(&raw)?;
    Ok(UserId::new(raw))
}

fn parse_screen(name: &str) -> anyhow::Result<Screen> {
    Screen::from_id(name.trim()).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown screen '{}' (expected home, scanner or profile)",
            name.trim()
        )
    })
}

/// Non-interactive tour smoke.
///
/// `None` or `all` drives every screen in onboarding order against the configured store. A
/// single screen runs alone against a fresh in-memory store with that screen unlocked.
/// Writes `tour_smoke_transcript.log` under the log folder.
pub fn run_tour_smoke(target: Option<String>, config: Option<PathBuf>, user: Option<String>) {
    if let Err(e) = init_logging(true) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    info!(
        "[PHASE: smoke] [STEP: start] Tour smoke starting at {}",
        chrono::Utc::now()
    );
    let settings = load_settings(config.as_deref());

    block_on_or_exit("smoke", async move {
        let user = parse_user(user)?;
        let target = target.unwrap_or_else(|| "all".to_string());

        let (store, screens): (Arc<dyn FlagStore>, Vec<Screen>) =
            if target.trim().eq_ignore_ascii_case("all") {
                (
                    persistence::open_store(&settings.store).await?,
                    ONBOARDING_ORDER.to_vec(),
                )
            } else {
                let screen = parse_screen(&target)?;
                let store = MemoryFlagStore::with_flags(
                    user.clone(),
                    smoke::unlocked_flags(screen),
                );
                (Arc::new(store), vec![screen])
            };

        let mut transcript = Vec::new();
        let runs = smoke::tour_smoke(&settings, store, user, &screens, &mut transcript).await?;

        let log_dir = utils::path_resolver::resolve_log_folder()?;
        let path = log_dir.join("tour_smoke_transcript.log");
        std::fs::write(&path, &transcript)
            .with_context(|| format!("Failed to write transcript to {:?}", path))?;

        info!(
            "[PHASE: smoke] [STEP: done] Tour smoke finished (screens={}, transcript={:?})",
            runs.len(),
            path
        );
        Ok(())
    });
}

/// Render the first visible step of `screen` into a terminal frame and print it.
pub fn run_preview(screen: String, config: Option<PathBuf>) {
    // File-only logging: stdout carries the frame.
    if let Err(e) = init_logging(false) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    let settings = load_settings(config.as_deref());

    block_on_or_exit("preview", async move {
        let screen = parse_screen(&screen)?;
        let frame = smoke::preview(&settings, screen).await?;
        print!("{}", frame);
        Ok(())
    });
}

/// Administrative reset of every tutorial flag for `user`.
pub fn run_reset_flags(user: Option<String>, config: Option<PathBuf>) {
    if let Err(e) = init_logging(true) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    let settings = load_settings(config.as_deref());

    block_on_or_exit("reset", async move {
        let user = user.ok_or_else(|| anyhow::anyhow!("--reset-flags requires --user=<id>"))?;
        let user = parse_user(Some(user))?;
        let store = persistence::open_store(&settings.store).await?;
        let gate = PersistenceGate::new(store, user.clone());
        gate.reset()
            .await
            .with_context(|| format!("Failed to reset tutorial flags for {}", user))?;
        println!("Tutorial flags reset for {}", user);
        Ok(())
    });
}
