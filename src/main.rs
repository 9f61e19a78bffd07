#![forbid(unsafe_code)]

mod animation;
mod autohide;
mod compositor;
mod config;
mod constants;
mod dnd;
mod dock;
mod font;
mod hotkeys;
mod hover;
mod input;
mod items;
mod layout;
mod remote;
mod shell;
mod surface;
mod trial;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::mpsc;
use std::time::SystemTime;
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;
use x11rb::connection::Connection;

use compositor::FrameCompositor;
use config::PersistentState;
use font::FontRenderer;
use items::ItemStore;
use remote::{ApiClient, TokenStore};
use shell::{DesktopDispatch, Shell, ZenityPrompts};
use surface::{CachedAtoms, XContext};
use trial::TrialStamp;

/// Translucent edge-docked launcher overlay
#[derive(Parser, Debug)]
#[command(name = "sidedock", version, about)]
struct Cli {
    /// Log level: trace, debug, info, warn, error (overrides LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_log_level(cli: &Cli) -> TraceLevel {
    let value = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());
    match value.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_log_level(&cli))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let (conn, screen_num) = x11rb::connect(None)?;
    let screen = &conn.setup().roots[screen_num];
    info!(
        screen = screen_num,
        width = screen.width_in_pixels,
        height = screen.height_in_pixels,
        "connected to x11"
    );

    let config = PersistentState::load();
    info!(side = ?config.global.side, categories = config.categories.len(), "config loaded");

    check_subscription(&config);

    let font = FontRenderer::from_system_font(config.global.text_size)
        .context("No usable system font found")?;
    let label_font = FontRenderer::from_system_font(config.global.text_size - 2.0)
        .context("No usable system font found")?;
    let item_font = FontRenderer::from_system_font(config.global.text_size + 4.0)
        .context("No usable system font found")?;

    let store = ItemStore::from_saved(
        config.categories.clone(),
        &item_font,
        config.global.item_size as usize,
    );

    let (hotkey_tx, hotkey_rx) = mpsc::channel();
    let _hotkey_handles = if hotkeys::check_permissions() {
        match hotkeys::spawn_listener(&config.hotkeys, hotkey_tx) {
            Ok(handles) => handles,
            Err(e) => {
                error!(error = %e, "Failed to start hotkey listener");
                hotkeys::print_permission_error();
                Vec::new()
            }
        }
    } else {
        hotkeys::print_permission_error();
        Vec::new()
    };

    let atoms = CachedAtoms::new(&conn)?;
    let ctx = XContext {
        conn: &conn,
        screen,
    };

    let compositor = FrameCompositor::new(font, label_font);
    let dispatch = Box::new(DesktopDispatch::new(config.tools.clone()));
    let prompts = Box::new(ZenityPrompts);
    let mut shell = Shell::new(
        &ctx, &atoms, config, store, compositor, item_font, dispatch, prompts, hotkey_rx,
    )?;

    shell.run(&ctx, &atoms)?;
    Ok(())
}

/// Startup subscription check. Signed-out or unreachable both degrade
/// to the trial stamp, which itself fails open.
fn check_subscription(config: &PersistentState) {
    let tokens = TokenStore::new();
    let token = tokens.load();
    let signed_in = token.is_some();
    if signed_in {
        match ApiClient::new(config.global.service_url.clone(), token) {
            Ok(client) => {
                let outcome = client.post("v1/subscription", &serde_json::json!({}));
                if outcome.success {
                    info!("subscription active");
                    return;
                }
                warn!(message = %outcome.message, "subscription check failed");
            }
            Err(e) => warn!(error = ?e, "could not build service client"),
        }
    }
    if TrialStamp::new().is_active(SystemTime::now()) {
        info!("running on trial");
    } else {
        warn!("trial period over and no active subscription");
    }
}
