//! Overlay shell: the docked launcher bar, the companion grid window,
//! and the event loop tying controllers, compositor, and X11 together.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::Window;

use crate::animation::AnimationScheduler;
use crate::autohide::{AutoHideController, HidePhase};
use crate::compositor::{BarScene, FrameCompositor, GridScene, ItemVisual};
use crate::config::PersistentState;
use crate::constants::{grid as gridc, mouse, panel, timing};
use crate::dnd::{DndSignal, DndState};
use crate::dock::{DockController, DockState};
use crate::font::FontRenderer;
use crate::hover::HoverAnimationController;
use crate::input::{
    hit_test_grid, DeactivationOutcome, DeactivationPoll, GridHitContext, HitTarget,
    PressTracker, TooltipTimer,
};
use crate::items::{self, IconBitmap, ItemStore, SavedItem};
use crate::layout::{self, GridMetrics, ScrollState};
use crate::surface::{self, OverlaySurface, XContext};
use crate::types::{Dimensions, Position, Rect, Side};

/// Grid overlay window width, shadow margins included
const GRID_WIDTH: u16 = 320;
/// Inner padding between the bar body edge and its launcher column
const BAR_PADDING: u16 = 10;
/// Launcher tool ids live above any conceivable item id
const TOOL_ID_BASE: u32 = u32::MAX - 64;
/// Pseudo-tool that toggles the grid overlay instead of spawning anything
const GRID_TOOL: &str = "grid";

/// Seam to the external tool programs; the shell only dispatches
pub trait ToolDispatch {
    fn launch_tool(&mut self, name: &str) -> Result<()>;
    fn open_path(&mut self, path: &Path) -> Result<()>;
}

/// Spawns detached desktop processes: configured commands for tools,
/// the desktop opener for grid items.
pub struct DesktopDispatch {
    commands: std::collections::HashMap<String, String>,
}

impl DesktopDispatch {
    pub fn new(commands: std::collections::HashMap<String, String>) -> Self {
        Self { commands }
    }
}

impl ToolDispatch for DesktopDispatch {
    fn launch_tool(&mut self, name: &str) -> Result<()> {
        let command = self
            .commands
            .get(name)
            .with_context(|| format!("No command configured for tool '{name}'"))?;
        info!(tool = %name, command = %command, "launching tool");
        Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to launch tool '{name}'"))?;
        Ok(())
    }

    fn open_path(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "opening item");
        Command::new("xdg-open")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(())
    }
}

/// Seam to blocking modal dialogs. The shell holds
/// `operation_in_progress` while one is open so auto-hide cannot
/// collapse the panel mid-edit.
pub trait ModalPrompts {
    /// Ask for a line of text; None when the user cancels
    fn prompt_text(&mut self, title: &str, initial: &str) -> Result<Option<String>>;
    /// Yes/no question
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Dialogs via the desktop's `zenity`; absence surfaces as a toast
pub struct ZenityPrompts;

impl ModalPrompts for ZenityPrompts {
    fn prompt_text(&mut self, title: &str, initial: &str) -> Result<Option<String>> {
        let output = Command::new("zenity")
            .args([
                "--entry",
                "--title",
                title,
                "--text",
                title,
                "--entry-text",
                initial,
            ])
            .stdin(Stdio::null())
            .output()
            .context("Failed to run zenity; is it installed?")?;
        if !output.status.success() {
            // Cancelled
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        let status = Command::new("zenity")
            .args(["--question", "--text", question])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .context("Failed to run zenity; is it installed?")?;
        Ok(status.success())
    }
}

// Prompted layout edits. Each returns Ok(true) when the layout changed
// and the caller should persist and re-render.

fn run_add_category(store: &mut ItemStore, prompts: &mut dyn ModalPrompts) -> Result<bool> {
    match prompts.prompt_text("New category", "")? {
        Some(name) => store.add_category(&name).map(|()| true),
        None => Ok(false),
    }
}

fn run_rename_category(
    store: &mut ItemStore,
    prompts: &mut dyn ModalPrompts,
    index: usize,
) -> Result<bool> {
    let Some(current) = store.categories().get(index).map(|c| c.name.clone()) else {
        return Ok(false);
    };
    match prompts.prompt_text("Rename category", &current)? {
        Some(name) if name != current => store.rename_category(index, &name).map(|()| true),
        _ => Ok(false),
    }
}

fn run_delete_category(
    store: &mut ItemStore,
    prompts: &mut dyn ModalPrompts,
    index: usize,
) -> Result<bool> {
    let Some(category) = store.categories().get(index) else {
        return Ok(false);
    };
    let question = format!(
        "Delete category '{}' and its {} item(s)?",
        category.name,
        category.items.len()
    );
    if !prompts.confirm(&question)? {
        return Ok(false);
    }
    store.delete_category(index).map(|()| true)
}

fn run_rename_item(
    store: &mut ItemStore,
    prompts: &mut dyn ModalPrompts,
    id: u32,
) -> Result<bool> {
    let Some(current) = store.item_by_id(id).map(|i| i.saved.label.clone()) else {
        return Ok(false);
    };
    match prompts.prompt_text("Rename item", &current)? {
        Some(label) if label != current => store.rename_item(id, &label).map(|()| true),
        _ => Ok(false),
    }
}

fn run_delete_item(
    store: &mut ItemStore,
    prompts: &mut dyn ModalPrompts,
    id: u32,
) -> Result<bool> {
    let Some(label) = store.item_by_id(id).map(|i| i.saved.label.clone()) else {
        return Ok(false);
    };
    if !prompts.confirm(&format!("Delete '{label}'?"))? {
        return Ok(false);
    }
    store.delete_item(id).map(|()| true)
}

/// Result of one background drop copy
struct DropCopy {
    source: PathBuf,
    outcome: Result<PathBuf>,
}

/// Worker-thread body: the event loop never blocks on file copies
fn copy_dropped(paths: Vec<PathBuf>, storage: PathBuf, tx: Sender<DropCopy>) {
    for source in paths {
        let outcome = copy_one(&source, &storage);
        if tx.send(DropCopy { source, outcome }).is_err() {
            return;
        }
    }
}

fn copy_one(source: &Path, storage: &Path) -> Result<PathBuf> {
    fs::create_dir_all(storage)
        .with_context(|| format!("Failed to create storage directory {}", storage.display()))?;
    let name = source.file_name().context("Dropped path has no name")?;
    let dest = storage.join(name);
    items::copy_tolerant(source, &dest)?;
    Ok(dest)
}

/// Short-lived on-screen notification
#[derive(Debug, Default)]
pub struct ToastState {
    message: Option<(String, Instant)>,
}

impl ToastState {
    pub fn show(&mut self, message: impl Into<String>, now: Instant) {
        self.message = Some((message.into(), now + timing::TOAST_LIFETIME));
    }

    pub fn current(&mut self, now: Instant) -> Option<&str> {
        if let Some((_, until)) = &self.message {
            if now >= *until {
                self.message = None;
            }
        }
        self.message.as_ref().map(|(m, _)| m.as_str())
    }

    pub fn is_visible(&self) -> bool {
        self.message.is_some()
    }
}

/// One launcher entry on the bar
struct Tool {
    id: u32,
    name: String,
    icon: IconBitmap,
}

pub struct Shell {
    config: PersistentState,
    store: ItemStore,
    compositor: FrameCompositor,
    font: FontRenderer,
    dispatch: Box<dyn ToolDispatch>,
    prompts: Box<dyn ModalPrompts>,

    scheduler: AnimationScheduler,
    dock_state: DockState,
    dock: DockController,
    autohide: AutoHideController,
    hover: HoverAnimationController,

    bar: OverlaySurface,
    grid: Option<OverlaySurface>,
    tools: Vec<Tool>,
    scroll: ScrollState,
    press: PressTracker,
    tooltip: TooltipTimer,
    deactivation: DeactivationPoll,
    dnd: DndState,
    toast: ToastState,
    hotkey_rx: Receiver<String>,
    drop_tx: Sender<DropCopy>,
    drop_rx: Receiver<DropCopy>,
    pending_drops: usize,

    screen_size: Dimensions,
    bar_dirty: bool,
    grid_dirty: bool,
}

impl Shell {
    pub fn new(
        ctx: &XContext<'_>,
        atoms: &surface::CachedAtoms,
        config: PersistentState,
        store: ItemStore,
        compositor: FrameCompositor,
        font: FontRenderer,
        dispatch: Box<dyn ToolDispatch>,
        prompts: Box<dyn ModalPrompts>,
        hotkey_rx: Receiver<String>,
    ) -> Result<Self> {
        let screen_size = Dimensions::new(
            ctx.screen.width_in_pixels,
            ctx.screen.height_in_pixels,
        );

        let mut tools = vec![Tool {
            id: TOOL_ID_BASE,
            name: GRID_TOOL.to_string(),
            icon: IconBitmap::placeholder(&font, GRID_TOOL, config.global.item_size as usize),
        }];
        let mut names: Vec<&String> = config.tools.keys().collect();
        names.sort();
        for (i, name) in names.into_iter().enumerate() {
            tools.push(Tool {
                id: TOOL_ID_BASE + 1 + i as u32,
                name: name.clone(),
                icon: IconBitmap::placeholder(&font, name, config.global.item_size as usize),
            });
        }

        let bar_size = bar_size(&config, tools.len());
        let side = config.global.side;
        let bar_x = layout::docked_x(
            side,
            screen_size.width,
            bar_size.width,
            config.global.shadow_margin,
        );
        let bar_pos = Position::new(bar_x, config.global.panel_y);
        let mut bar = OverlaySurface::create(ctx, atoms, bar_pos, bar_size)?;
        bar.set_mapped(ctx.conn, true)?;

        let mut autohide = AutoHideController::new(bar_size.width);
        let mut dock_state = DockState::new(side);
        if config.global.lock_auto_hide {
            autohide.set_lock(&mut dock_state, true);
        }

        let dnd = DndState::new(ctx.conn)?;
        dnd.advertise(ctx.conn, bar.window())?;
        let (drop_tx, drop_rx) = mpsc::channel();

        Ok(Self {
            config,
            store,
            compositor,
            font,
            dispatch,
            prompts,
            scheduler: AnimationScheduler::new(),
            dock_state,
            dock: DockController::new(),
            autohide,
            hover: HoverAnimationController::new(),
            bar,
            grid: None,
            tools,
            scroll: ScrollState::default(),
            press: PressTracker::default(),
            tooltip: TooltipTimer::default(),
            deactivation: DeactivationPoll::default(),
            dnd,
            toast: ToastState::default(),
            hotkey_rx,
            drop_tx,
            drop_rx,
            pending_drops: 0,
            screen_size,
            bar_dirty: true,
            grid_dirty: false,
        })
    }

    fn side(&self) -> Side {
        self.dock_state.side
    }

    fn shadow_margin(&self) -> u16 {
        self.config.global.shadow_margin
    }

    fn bar_rect(&self) -> Rect {
        let pos = self.bar.position();
        let size = self.bar.size();
        Rect::new(pos.x, pos.y, size.width, size.height)
    }

    fn bar_body(&self) -> Rect {
        layout::overlay_body(self.bar.size(), self.shadow_margin())
    }

    fn grid_metrics(&self, body: Rect) -> GridMetrics {
        let g = &self.config.global;
        GridMetrics {
            origin: Position::new(
                body.x + g.spacing as i16,
                body.y + panel::CATEGORY_BAR_HEIGHT as i16 + g.spacing as i16,
            ),
            avail_width: layout::grid_avail_width(
                body.width.saturating_sub(g.spacing * 2),
                g.spacing,
            ),
            item_size: g.item_size,
            spacing: g.spacing,
            row_height: gridc::ROW_HEIGHT,
            row_gap: gridc::ROW_GAP,
            cap_height: gridc::CAP_HEIGHT,
            min_height: gridc::MIN_HEIGHT,
        }
    }

    fn grid_geometry(&self) -> (Position, Dimensions, Rect) {
        let margin = self.shadow_margin();
        let g = &self.config.global;
        let body_width = GRID_WIDTH - margin * 2;
        let probe_body = Rect::new(margin as i16, margin as i16, body_width, 0);
        let metrics = self.grid_metrics(probe_body);
        let content = metrics.content_height(self.store.active_items().len());
        let body_height =
            panel::CATEGORY_BAR_HEIGHT + g.spacing * 2 + content + g.spacing;
        let size = Dimensions::new(GRID_WIDTH, body_height + margin * 2);
        let body = layout::overlay_body(size, margin);

        // Beside the bar, toward screen center
        let bar = self.bar_rect();
        let x = match self.side() {
            Side::Left => bar.right() - margin as i16,
            Side::Right => bar.left() - size.width as i16 + margin as i16,
        };
        let pos = Position::new(
            x.clamp(0, (self.screen_size.width.saturating_sub(size.width)) as i16),
            bar.y,
        );
        (pos, size, body)
    }

    pub fn toggle_grid(&mut self, ctx: &XContext<'_>, atoms: &surface::CachedAtoms) -> Result<()> {
        match self.grid.take() {
            Some(grid) => {
                info!("closing grid overlay");
                grid.destroy(ctx.conn);
                self.deactivation.cancel();
            }
            None => {
                info!("opening grid overlay");
                let (pos, size, _) = self.grid_geometry();
                let mut grid = OverlaySurface::create(ctx, atoms, pos, size)?;
                grid.set_mapped(ctx.conn, true)?;
                self.dnd.advertise(ctx.conn, grid.window())?;
                self.scroll = ScrollState::default();
                self.grid = Some(grid);
                self.grid_dirty = true;
            }
        }
        Ok(())
    }

    fn close_grid(&mut self, ctx: &XContext<'_>) {
        if let Some(grid) = self.grid.take() {
            info!("grid overlay deactivated");
            grid.destroy(ctx.conn);
        }
        self.deactivation.cancel();
    }

    fn persist_layout(&mut self) {
        if let Err(e) = self.config.update_layout(self.store.to_saved()) {
            warn!(error = ?e, "failed to persist layout");
        }
    }

    // ------------------------------------------------------------------
    // Event handling

    pub fn handle_event(
        &mut self,
        ctx: &XContext<'_>,
        atoms: &surface::CachedAtoms,
        event: Event,
        now: Instant,
    ) -> Result<()> {
        if let Some(signal) = self.dnd.handle_event(ctx.conn, &event)? {
            self.handle_dnd(signal);
            return Ok(());
        }
        match event {
            Event::ButtonPress(ev) => {
                if ev.event == self.bar.window() {
                    self.bar_press(ev.detail, Position::new(ev.event_x, ev.event_y), ev.root_x, ev.root_y);
                } else if self.grid_window() == Some(ev.event) {
                    self.grid_press(ev.detail, Position::new(ev.event_x, ev.event_y));
                }
            }
            Event::ButtonRelease(ev) => {
                if ev.event == self.bar.window() {
                    self.bar_release(ctx, atoms, Position::new(ev.event_x, ev.event_y))?;
                } else if self.grid_window() == Some(ev.event) {
                    self.grid_release(ctx, Position::new(ev.event_x, ev.event_y), now)?;
                }
            }
            Event::MotionNotify(ev) => {
                if ev.event == self.bar.window() {
                    self.bar_motion(ctx, Position::new(ev.event_x, ev.event_y), Position::new(ev.root_x, ev.root_y))?;
                } else if self.grid_window() == Some(ev.event) {
                    self.grid_motion(Position::new(ev.event_x, ev.event_y), now);
                }
            }
            Event::FocusOut(ev) => {
                if self.grid_window() == Some(ev.event) {
                    let (_, buttons) = surface::query_pointer(ctx)?;
                    if self.deactivation.focus_lost(buttons, now) == DeactivationOutcome::Close {
                        self.close_grid(ctx);
                    }
                }
            }
            Event::Expose(ev) => {
                if ev.window == self.bar.window() {
                    self.bar_dirty = true;
                } else if self.grid_window() == Some(ev.window) {
                    self.grid_dirty = true;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn grid_window(&self) -> Option<Window> {
        self.grid.as_ref().map(|g| g.window())
    }

    fn handle_dnd(&mut self, signal: DndSignal) {
        match signal {
            DndSignal::Entered => {
                self.deactivation.drag_signal();
                self.dock_state.operation_in_progress = true;
            }
            DndSignal::Left => {
                if self.pending_drops == 0 {
                    self.dock_state.operation_in_progress = false;
                }
            }
            DndSignal::Dropped(paths) => {
                if paths.is_empty() {
                    self.dock_state.operation_in_progress = false;
                    return;
                }
                // Copies run on a worker thread; results come back through
                // drop_rx and are folded into the store by the tick
                self.pending_drops += paths.len();
                let storage = PersistentState::storage_dir();
                let tx = self.drop_tx.clone();
                std::thread::spawn(move || copy_dropped(paths, storage, tx));
            }
        }
    }

    fn bar_press(&mut self, button: u8, at: Position, root_x: i16, root_y: i16) {
        if button != mouse::BUTTON_LEFT {
            return;
        }
        match self.bar_hit(at) {
            HitTarget::Item(id) => self.press.press(at, HitTarget::Item(id)),
            HitTarget::LockToggle => self.press.press(at, HitTarget::LockToggle),
            HitTarget::Chrome => {
                self.dock.begin_drag(
                    &mut self.dock_state,
                    Position::new(root_x, root_y),
                    self.bar.position(),
                );
            }
            _ => {}
        }
    }

    fn bar_motion(&mut self, ctx: &XContext<'_>, at: Position, root: Position) -> Result<()> {
        if self.dock.is_dragging() {
            let pos = self.dock.drag_to(root, self.bar.size(), self.screen_size);
            self.bar.move_to(ctx.conn, pos)?;
            return Ok(());
        }
        let hovered = match self.bar_hit(at) {
            HitTarget::Item(id) => Some(id),
            _ => None,
        };
        if self.hover.set_hovered(&mut self.scheduler, hovered) {
            self.bar_dirty = true;
        }
        Ok(())
    }

    fn bar_release(
        &mut self,
        ctx: &XContext<'_>,
        atoms: &surface::CachedAtoms,
        at: Position,
    ) -> Result<()> {
        if self.dock.is_dragging() {
            let rect = self.bar_rect();
            let margin = self.shadow_margin();
            let side = self.dock.end_drag(
                &mut self.dock_state,
                &mut self.scheduler,
                rect,
                margin,
                self.screen_size,
            );
            if let Err(e) = self.config.update_side(side) {
                warn!(error = ?e, "failed to persist dock side");
            }
            // The grid follows the bar once the snap lands
            self.grid_dirty = true;
            return Ok(());
        }
        match self.press.release(at) {
            Some(HitTarget::Item(id)) => {
                let name = self
                    .tools
                    .iter()
                    .find(|t| t.id == id)
                    .map(|t| t.name.clone());
                if let Some(name) = name {
                    self.activate_tool(ctx, atoms, &name)?;
                }
            }
            Some(HitTarget::LockToggle) => self.toggle_lock(),
            _ => {}
        }
        Ok(())
    }

    fn activate_tool(
        &mut self,
        ctx: &XContext<'_>,
        atoms: &surface::CachedAtoms,
        name: &str,
    ) -> Result<()> {
        if name == GRID_TOOL {
            self.toggle_grid(ctx, atoms)?;
        } else if let Err(e) = self.dispatch.launch_tool(name) {
            warn!(tool = %name, error = ?e, "tool launch failed");
            self.toast.show(format!("Could not launch {name}"), Instant::now());
            self.bar_dirty = true;
        }
        Ok(())
    }

    fn toggle_lock(&mut self) {
        let lock = !self.dock_state.lock;
        self.autohide.set_lock(&mut self.dock_state, lock);
        self.config.global.lock_auto_hide = lock;
        if let Err(e) = self.config.save() {
            warn!(error = ?e, "failed to persist lock state");
        }
        self.bar_dirty = true;
        self.grid_dirty = true;
    }

    /// Bar hit test: lock toggle, then launcher cells, then chrome
    fn bar_hit(&self, at: Position) -> HitTarget {
        let body = self.bar_body();
        if !body.contains(at.x, at.y) {
            return HitTarget::Outside;
        }
        if layout::lock_toggle_rect(body, self.side()).contains(at.x, at.y) {
            return HitTarget::LockToggle;
        }
        for (i, tool) in self.tools.iter().enumerate() {
            if self.bar_item_rect(body, i).contains(at.x, at.y) {
                return HitTarget::Item(tool.id);
            }
        }
        HitTarget::Chrome
    }

    fn bar_item_rect(&self, body: Rect, index: usize) -> Rect {
        let g = &self.config.global;
        Rect::new(
            body.x + BAR_PADDING as i16,
            body.y
                + BAR_PADDING as i16
                + index as i16 * (g.item_size + g.spacing) as i16,
            g.item_size,
            g.item_size,
        )
    }

    fn grid_press(&mut self, button: u8, at: Position) {
        let Some(target) = self.grid_hit(at) else {
            return;
        };
        match button {
            mouse::BUTTON_LEFT => {
                if target != HitTarget::Outside {
                    self.press.press(at, target);
                }
            }
            // Middle-click renames, right-click deletes (after a
            // confirmation) or adds a category on empty chrome
            mouse::BUTTON_MIDDLE => match target {
                HitTarget::Item(id) => self.edit_layout(|s, p| run_rename_item(s, p, id)),
                HitTarget::Category(index) => {
                    self.edit_layout(|s, p| run_rename_category(s, p, index));
                }
                _ => {}
            },
            mouse::BUTTON_RIGHT => match target {
                HitTarget::Item(id) => self.delete_item(id),
                HitTarget::Category(index) => {
                    self.edit_layout(|s, p| run_delete_category(s, p, index));
                }
                HitTarget::Chrome => self.edit_layout(run_add_category),
                _ => {}
            },
            mouse::BUTTON_SCROLL_UP => self.scroll_grid(-(gridc::ROW_HEIGHT as i32) / 2),
            mouse::BUTTON_SCROLL_DOWN => self.scroll_grid(gridc::ROW_HEIGHT as i32 / 2),
            _ => {}
        }
    }

    /// Run a prompted layout edit with `operation_in_progress` held;
    /// persist on change, toast on failure
    fn edit_layout<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut ItemStore, &mut dyn ModalPrompts) -> Result<bool>,
    {
        self.dock_state.operation_in_progress = true;
        let result = edit(&mut self.store, self.prompts.as_mut());
        self.dock_state.operation_in_progress = false;
        match result {
            Ok(true) => self.persist_layout(),
            Ok(false) => {}
            Err(e) => {
                warn!(error = ?e, "layout edit failed");
                self.toast.show(format!("{e:#}"), Instant::now());
            }
        }
        self.grid_dirty = true;
    }

    fn scroll_grid(&mut self, delta: i32) {
        let before = self.scroll.offset();
        self.scroll.scroll_by(delta);
        if self.scroll.offset() != before {
            self.grid_dirty = true;
        }
    }

    fn delete_item(&mut self, id: u32) {
        self.dock_state.operation_in_progress = true;
        let result = run_delete_item(&mut self.store, self.prompts.as_mut(), id);
        self.dock_state.operation_in_progress = false;
        match result {
            Ok(true) => {
                self.hover.forget(&mut self.scheduler, id);
                self.persist_layout();
            }
            Ok(false) => {}
            Err(e) => {
                warn!(id, error = ?e, "delete failed");
                self.toast.show(format!("{e:#}"), Instant::now());
            }
        }
        self.grid_dirty = true;
    }

    fn grid_motion(&mut self, at: Position, now: Instant) {
        let hovered = match self.grid_hit(at) {
            Some(HitTarget::Item(id)) => Some(id),
            _ => None,
        };
        if self.hover.set_hovered(&mut self.scheduler, hovered) {
            self.tooltip.hover_changed(hovered, now);
            self.grid_dirty = true;
        }
    }

    fn grid_release(&mut self, ctx: &XContext<'_>, at: Position, now: Instant) -> Result<()> {
        match self.press.release(at) {
            Some(HitTarget::Item(id)) => {
                let path = self.store.item_by_id(id).map(|i| i.saved.path.clone());
                if let Some(path) = path {
                    if let Err(e) = self.dispatch.open_path(&path) {
                        warn!(error = ?e, "open failed");
                        self.toast.show(format!("Could not open {}", path.display()), now);
                    } else {
                        self.close_grid(ctx);
                    }
                    self.grid_dirty = true;
                }
            }
            Some(HitTarget::Category(index)) => {
                self.store.set_active(index);
                self.scroll = ScrollState::default();
                self.grid_dirty = true;
            }
            Some(HitTarget::LockToggle) => self.toggle_lock(),
            _ => {}
        }
        Ok(())
    }

    fn grid_hit(&self, at: Position) -> Option<HitTarget> {
        let grid = self.grid.as_ref()?;
        let body = layout::overlay_body(grid.size(), self.shadow_margin());
        let metrics = self.grid_metrics(body);
        let ids: Vec<u32> = self.store.active_items().iter().map(|i| i.id).collect();
        let ctx = GridHitContext {
            body,
            side: self.side(),
            category_bar: layout::category_strip(body, self.config.global.spacing),
            category_count: self.store.categories().len(),
            metrics: &metrics,
            item_ids: &ids,
            scroll: &self.scroll,
            dragging: self.dock.is_dragging(),
        };
        Some(hit_test_grid(&ctx, at.x, at.y))
    }

    // ------------------------------------------------------------------
    // Tick

    /// One ~60Hz step: animations, pointer sampling, timers, re-render
    pub fn tick(
        &mut self,
        ctx: &XContext<'_>,
        atoms: &surface::CachedAtoms,
        now: Instant,
    ) -> Result<()> {
        for tool in self.hotkey_rx.try_iter().collect::<Vec<_>>() {
            self.activate_tool(ctx, atoms, &tool)?;
        }

        let finished: Vec<DropCopy> = self.drop_rx.try_iter().collect();
        if !finished.is_empty() {
            for copy in finished {
                self.pending_drops = self.pending_drops.saturating_sub(1);
                match copy.outcome {
                    Ok(dest) => {
                        let label = copy
                            .source
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "item".to_string());
                        let id = self.store.add_prepared(
                            &self.font,
                            SavedItem {
                                label,
                                path: dest,
                                original_path: copy.source,
                                owned_copy: true,
                            },
                        );
                        debug!(id, "dropped item added");
                    }
                    Err(e) => {
                        warn!(path = %copy.source.display(), error = ?e, "drop failed");
                        self.toast
                            .show(format!("Could not add {}", copy.source.display()), now);
                    }
                }
            }
            if self.pending_drops == 0 {
                self.dock_state.operation_in_progress = false;
            }
            self.persist_layout();
            self.bar_dirty = true;
            self.grid_dirty = true;
        }

        let animating = self.scheduler.tick(now);
        if animating {
            self.bar_dirty = true;
            self.grid_dirty = true;
        }

        if let Some(x) = self.dock.animated_x(&self.scheduler, false) {
            let pos = Position::new(x, self.bar.position().y);
            self.bar.move_to(ctx.conn, pos)?;
            if self.grid.is_some() {
                let (gpos, _, _) = self.grid_geometry();
                if let Some(grid) = self.grid.as_mut() {
                    grid.move_to(ctx.conn, gpos)?;
                }
            }
        }

        let (pointer, buttons) = surface::query_pointer(ctx)?;
        let strip = layout::edge_strip(
            self.side(),
            self.screen_size.width,
            self.bar.position().y,
            self.bar.size().height,
        );
        // The grid counts as panel area so it does not trigger collapse
        let over_grid = self
            .grid
            .as_ref()
            .map(|g| {
                Rect::new(g.position().x, g.position().y, g.size().width, g.size().height)
                    .contains(pointer.x, pointer.y)
            })
            .unwrap_or(false);
        if !over_grid {
            self.autohide
                .sample(&self.dock_state, pointer, self.bar_rect(), strip);
        }
        if let Some(width) = self.autohide.tick() {
            let full = bar_size(&self.config, self.tools.len());
            let left_x = layout::docked_x(
                Side::Left,
                self.screen_size.width,
                full.width,
                self.shadow_margin(),
            );
            let x = self.autohide.anchored_x(
                self.side(),
                self.screen_size.width,
                self.shadow_margin(),
                left_x,
            );
            if width == 0 {
                self.bar.set_mapped(ctx.conn, false)?;
            } else {
                self.bar.set_mapped(ctx.conn, true)?;
                self.bar
                    .resize(ctx.conn, Dimensions::new(width, full.height))?;
                self.bar
                    .move_to(ctx.conn, Position::new(x, self.bar.position().y))?;
            }
            self.bar_dirty = true;
        } else if self.autohide.phase() == HidePhase::Expanding
            || (self.autohide.phase() == HidePhase::Expanded && !self.bar.is_mapped())
        {
            self.bar.set_mapped(ctx.conn, true)?;
        }

        if let Some(id) = self.tooltip.due(now) {
            if let Some(item) = self.store.item_by_id(id) {
                self.toast.show(item.saved.label.clone(), now);
                self.grid_dirty = true;
            }
        }
        if self.toast.is_visible() && self.toast.current(now).is_none() {
            self.bar_dirty = true;
            self.grid_dirty = true;
        }

        if self.deactivation.is_active()
            && self.deactivation.poll(buttons, now) == DeactivationOutcome::Close
        {
            self.close_grid(ctx);
        }

        if self.bar_dirty {
            self.render_bar(ctx, now)?;
            self.bar_dirty = false;
        }
        if self.grid_dirty && self.grid.is_some() {
            self.render_grid(ctx, now)?;
            self.grid_dirty = false;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rendering

    fn render_bar(&mut self, ctx: &XContext<'_>, now: Instant) -> Result<()> {
        let body = self.bar_body();
        let mut visuals = Vec::with_capacity(self.tools.len());
        for (i, tool) in self.tools.iter().enumerate() {
            visuals.push(ItemVisual {
                rect: self.bar_item_rect(body, i),
                scale: self.hover.scale_of(&self.scheduler, tool.id),
                icon: &tool.icon,
                label: &tool.name,
            });
        }
        let toast = if self.grid.is_none() {
            self.toast.current(now).map(str::to_string)
        } else {
            None
        };
        let scene = BarScene {
            size: self.bar.size(),
            body,
            side: self.side(),
            fill_alpha: self.config.global.fill_alpha,
            corner_radius: self.config.global.corner_radius,
            shadow_margin: self.shadow_margin(),
            items: &visuals,
            item_size: self.config.global.item_size,
            locked: self.dock_state.lock,
            toast: toast.as_deref(),
        };
        let frame = self.compositor.render_bar(&scene);
        self.bar.publish(ctx.conn, &frame)
    }

    fn render_grid(&mut self, ctx: &XContext<'_>, now: Instant) -> Result<()> {
        let (pos, size, body) = self.grid_geometry();
        {
            let Some(grid) = self.grid.as_mut() else {
                return Ok(());
            };
            grid.resize(ctx.conn, size)?;
            grid.move_to(ctx.conn, pos)?;
        }

        let metrics = self.grid_metrics(body);
        let items = self.store.active_items();
        self.scroll.set_max(metrics.max_scroll(items.len()));

        let mut visuals = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            visuals.push(ItemVisual {
                rect: metrics.item_rect(i, self.scroll.offset()),
                scale: self.hover.scale_of(&self.scheduler, item.id),
                icon: &item.icon,
                label: &item.saved.label,
            });
        }
        let names = self.store.category_names();
        let category_bar = layout::category_strip(body, self.config.global.spacing);
        let grid_clip = Rect::new(
            body.x,
            metrics.origin.y,
            body.width,
            metrics.content_height(items.len()),
        );
        let toast = self.toast.current(now).map(str::to_string);
        let scene = GridScene {
            size,
            body,
            side: self.side(),
            fill_alpha: self.config.global.fill_alpha,
            corner_radius: self.config.global.corner_radius,
            shadow_margin: self.shadow_margin(),
            category_bar,
            categories: &names,
            active_category: self.store.active_index(),
            items: &visuals,
            item_size: self.config.global.item_size,
            grid_clip,
            required_height: metrics.required_height(items.len()),
            scroll: &self.scroll,
            locked: self.dock_state.lock,
            toast: toast.as_deref(),
        };
        let frame = self.compositor.render_grid(&scene);
        match self.grid.as_ref() {
            Some(grid) => grid.publish(ctx.conn, &frame),
            None => Ok(()),
        }
    }

    /// Blocking event loop; returns when the connection drops
    pub fn run(&mut self, ctx: &XContext<'_>, atoms: &surface::CachedAtoms) -> Result<()> {
        let mut next_tick = Instant::now();
        loop {
            while let Some(event) = ctx.conn.poll_for_event().context("X connection lost")? {
                let now = Instant::now();
                self.handle_event(ctx, atoms, event, now)?;
            }
            let now = Instant::now();
            if now >= next_tick {
                self.tick(ctx, atoms, now)?;
                next_tick = now + crate::constants::anim::TICK_INTERVAL;
            }
            std::thread::sleep(
                next_tick.saturating_duration_since(Instant::now()).min(
                    crate::constants::anim::TICK_INTERVAL,
                ),
            );
        }
    }
}

/// Full bar window size for a launcher column of `count` tools
fn bar_size(config: &PersistentState, count: usize) -> Dimensions {
    let g = &config.global;
    let margin = g.shadow_margin;
    let width = margin * 2 + BAR_PADDING * 2 + g.item_size;
    let column = count as u16 * g.item_size + count.saturating_sub(1) as u16 * g.spacing;
    let height = margin * 2 + BAR_PADDING * 2 + column;
    Dimensions::new(width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::config as cfgc;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Scripted dialog responses, consumed front to back
    struct StubPrompts {
        text: Vec<Option<String>>,
        answers: Vec<bool>,
    }

    impl ModalPrompts for StubPrompts {
        fn prompt_text(&mut self, _title: &str, _initial: &str) -> Result<Option<String>> {
            Ok(self.text.remove(0))
        }

        fn confirm(&mut self, _question: &str) -> Result<bool> {
            Ok(self.answers.remove(0))
        }
    }

    fn empty_store(font: &FontRenderer) -> ItemStore {
        ItemStore::from_saved(items::normalize_layout(Vec::new(), Vec::new()), font, 40)
    }

    #[test]
    fn category_add_and_rename_flow_through_prompts() {
        let font = match FontRenderer::from_system_font(12.0) {
            Ok(f) => f,
            // No fonts in minimal CI images
            Err(_) => return,
        };
        let mut store = empty_store(&font);
        let mut prompts = StubPrompts {
            text: vec![Some("Work".into()), Some("Play".into())],
            answers: Vec::new(),
        };
        assert!(run_add_category(&mut store, &mut prompts).unwrap());
        assert_eq!(store.category_names(), vec![cfgc::RESERVED_CATEGORY, "Work"]);
        assert!(run_rename_category(&mut store, &mut prompts, 1).unwrap());
        assert_eq!(store.category_names()[1], "Play");
    }

    #[test]
    fn cancelled_prompt_changes_nothing() {
        let font = match FontRenderer::from_system_font(12.0) {
            Ok(f) => f,
            Err(_) => return,
        };
        let mut store = empty_store(&font);
        let mut prompts = StubPrompts {
            text: vec![None],
            answers: Vec::new(),
        };
        assert!(!run_add_category(&mut store, &mut prompts).unwrap());
        assert_eq!(store.category_names().len(), 1);
    }

    #[test]
    fn category_delete_asks_before_removing() {
        let font = match FontRenderer::from_system_font(12.0) {
            Ok(f) => f,
            Err(_) => return,
        };
        let mut store = empty_store(&font);
        store.add_category("Work").unwrap();
        let mut prompts = StubPrompts {
            text: Vec::new(),
            answers: vec![false, true],
        };
        assert!(!run_delete_category(&mut store, &mut prompts, 1).unwrap());
        assert_eq!(store.category_names().len(), 2);
        assert!(run_delete_category(&mut store, &mut prompts, 1).unwrap());
        assert_eq!(store.category_names().len(), 1);
    }

    #[test]
    fn reserved_category_edits_error_through_the_flow() {
        let font = match FontRenderer::from_system_font(12.0) {
            Ok(f) => f,
            Err(_) => return,
        };
        let mut store = empty_store(&font);
        let mut prompts = StubPrompts {
            text: vec![Some("Other".into())],
            answers: vec![true],
        };
        assert!(run_rename_category(&mut store, &mut prompts, 0).is_err());
        assert!(run_delete_category(&mut store, &mut prompts, 0).is_err());
        assert_eq!(store.category_names(), vec![cfgc::RESERVED_CATEGORY]);
    }

    #[test]
    fn item_rename_and_delete_flow_through_prompts() {
        let font = match FontRenderer::from_system_font(12.0) {
            Ok(f) => f,
            Err(_) => return,
        };
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, b"x").unwrap();
        let mut store = empty_store(&font);
        let id = store.add_dropped(&font, &file, None).unwrap();

        let mut prompts = StubPrompts {
            text: vec![Some("Renamed".into())],
            answers: vec![false, true],
        };
        assert!(run_rename_item(&mut store, &mut prompts, id).unwrap());
        assert_eq!(store.item_by_id(id).unwrap().saved.label, "Renamed");

        // Declined confirmation keeps the item, accepted removes it
        assert!(!run_delete_item(&mut store, &mut prompts, id).unwrap());
        assert!(store.item_by_id(id).is_some());
        assert!(run_delete_item(&mut store, &mut prompts, id).unwrap());
        assert!(store.item_by_id(id).is_none());
    }

    #[test]
    fn drop_copies_run_off_thread_and_report_back() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, b"hello").unwrap();
        let missing = dir.path().join("missing.txt");
        let storage = dir.path().join("storage");

        let (tx, rx) = mpsc::channel();
        let worker = std::thread::spawn({
            let paths = vec![file.clone(), missing.clone()];
            let storage = storage.clone();
            move || copy_dropped(paths, storage, tx)
        });

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.source, file);
        assert_eq!(first.outcome.unwrap(), storage.join("doc.txt"));
        assert!(storage.join("doc.txt").exists());

        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(second.source, missing);
        assert!(second.outcome.is_err());
        worker.join().unwrap();
    }

    #[test]
    fn toast_expires_after_lifetime() {
        let mut toast = ToastState::default();
        let t0 = Instant::now();
        toast.show("saved", t0);
        assert_eq!(toast.current(t0), Some("saved"));
        assert_eq!(
            toast.current(t0 + timing::TOAST_LIFETIME - Duration::from_millis(1)),
            Some("saved")
        );
        assert_eq!(toast.current(t0 + timing::TOAST_LIFETIME), None);
        assert!(!toast.is_visible());
    }

    #[test]
    fn newer_toast_replaces_older() {
        let mut toast = ToastState::default();
        let t0 = Instant::now();
        toast.show("first", t0);
        let t1 = t0 + Duration::from_millis(500);
        toast.show("second", t1);
        assert_eq!(toast.current(t0 + timing::TOAST_LIFETIME), Some("second"));
    }

    #[test]
    fn bar_size_grows_with_tool_count() {
        let config = PersistentState::default();
        let one = bar_size(&config, 1);
        let four = bar_size(&config, 4);
        assert_eq!(one.width, four.width);
        let g = &config.global;
        assert_eq!(
            four.height - one.height,
            3 * (g.item_size + g.spacing)
        );
    }

    #[test]
    fn bar_width_fits_one_item_column() {
        let config = PersistentState::default();
        let size = bar_size(&config, 3);
        let g = &config.global;
        assert_eq!(
            size.width,
            g.shadow_margin * 2 + BAR_PADDING * 2 + g.item_size
        );
    }
}
