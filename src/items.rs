//! Items, categories, and the file operations behind them.
//!
//! Item ids are stable integers handed out at creation and never reused;
//! every animation and hit-test refers to items by id, not by value.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::constants::config as cfg;
use crate::font::FontRenderer;

/// Premultiplied ARGB icon pixels
#[derive(Debug, Clone)]
pub struct IconBitmap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u32>,
}

impl IconBitmap {
    /// Rounded tile with the label's first letter; used whenever a real
    /// icon cannot be decoded.
    pub fn placeholder(font: &FontRenderer, label: &str, side: usize) -> Self {
        let mut data = vec![0u32; side * side];
        let radius = (side / 5) as f32;
        for y in 0..side {
            for x in 0..side {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;
                let cx = radius.max(px.min(side as f32 - radius));
                let cy = radius.max(py.min(side as f32 - radius));
                let dist = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
                if dist == 0.0 || dist < radius + 0.5 {
                    data[y * side + x] = 0xE0585E6A;
                }
            }
        }
        let initial = label
            .chars()
            .next()
            .map(|c| c.to_uppercase().to_string())
            .unwrap_or_else(|| "?".to_string());
        if let Ok(text) = font.render_text(&initial, 0xFFFFFFFF) {
            let ox = (side as i32 - text.width as i32) / 2;
            let oy = (side as i32 - text.height as i32) / 2;
            for ty in 0..text.height {
                for tx in 0..text.width {
                    let px = ox + tx as i32;
                    let py = oy + ty as i32;
                    let src = text.data[ty * text.width + tx];
                    if src >> 24 != 0 && px >= 0 && py >= 0 && (px as usize) < side
                        && (py as usize) < side
                    {
                        data[py as usize * side + px as usize] = src;
                    }
                }
            }
        }
        Self {
            width: side,
            height: side,
            data,
        }
    }

    /// Decode a PNG into premultiplied ARGB; any failure falls back to the
    /// caller's placeholder.
    pub fn from_png(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open icon file: {}", path.display()))?;
        let decoder = png::Decoder::new(file);
        let mut reader = decoder
            .read_info()
            .with_context(|| format!("Failed to read PNG header: {}", path.display()))?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let frame = reader
            .next_frame(&mut buf)
            .with_context(|| format!("Failed to decode PNG frame: {}", path.display()))?;
        let width = frame.width as usize;
        let height = frame.height as usize;
        let mut data = Vec::with_capacity(width * height);
        match frame.color_type {
            png::ColorType::Rgba => {
                for px in buf[..frame.buffer_size()].chunks_exact(4) {
                    let a = px[3] as u32;
                    let pm = |c: u8| (c as u32 * a + 127) / 255;
                    data.push((a << 24) | (pm(px[0]) << 16) | (pm(px[1]) << 8) | pm(px[2]));
                }
            }
            png::ColorType::Rgb => {
                for px in buf[..frame.buffer_size()].chunks_exact(3) {
                    data.push(
                        0xFF00_0000
                            | ((px[0] as u32) << 16)
                            | ((px[1] as u32) << 8)
                            | px[2] as u32,
                    );
                }
            }
            other => anyhow::bail!("Unsupported PNG color type {:?}: {}", other, path.display()),
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }
}

/// Persisted form of an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedItem {
    pub label: String,
    pub path: PathBuf,
    pub original_path: PathBuf,
    /// True when the file is our private copy, false for a path reference
    #[serde(default)]
    pub owned_copy: bool,
}

/// Persisted form of a category; file order is insertion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedCategory {
    pub name: String,
    #[serde(default)]
    pub items: Vec<SavedItem>,
}

/// Normalize a loaded layout: guarantee the reserved category exists and
/// comes first, fold any legacy flat item list into it, and drop items
/// whose backing path disappeared.
pub fn normalize_layout(
    mut categories: Vec<SavedCategory>,
    legacy_items: Vec<SavedItem>,
) -> Vec<SavedCategory> {
    if !categories.iter().any(|c| c.name == cfg::RESERVED_CATEGORY) {
        categories.insert(
            0,
            SavedCategory {
                name: cfg::RESERVED_CATEGORY.to_string(),
                items: Vec::new(),
            },
        );
    }
    if !legacy_items.is_empty() {
        info!(count = legacy_items.len(), "migrating legacy flat item list");
        if let Some(reserved) = categories
            .iter_mut()
            .find(|c| c.name == cfg::RESERVED_CATEGORY)
        {
            reserved.items.extend(legacy_items);
        }
    }
    for category in &mut categories {
        category.items.retain(|item| {
            let exists = item.path.exists();
            if !exists {
                warn!(label = %item.label, path = %item.path.display(), "dropping item with missing path");
            }
            exists
        });
    }
    categories
}

/// Live item: saved attributes plus id and decoded icon
#[derive(Debug)]
pub struct Item {
    pub id: u32,
    pub saved: SavedItem,
    pub icon: IconBitmap,
}

#[derive(Debug)]
pub struct Category {
    pub name: String,
    pub items: Vec<Item>,
}

/// All categories and their items, plus the id allocator
pub struct ItemStore {
    categories: Vec<Category>,
    active: usize,
    next_id: u32,
    icon_side: usize,
}

impl ItemStore {
    pub fn from_saved(
        saved: Vec<SavedCategory>,
        font: &FontRenderer,
        icon_side: usize,
    ) -> Self {
        let mut store = Self {
            categories: Vec::new(),
            active: 0,
            next_id: 1,
            icon_side,
        };
        for category in saved {
            let mut items = Vec::new();
            for item in category.items {
                let id = store.allocate_id();
                let icon = store.load_icon(font, &item);
                items.push(Item {
                    id,
                    saved: item,
                    icon,
                });
            }
            store.categories.push(Category {
                name: category.name,
                items,
            });
        }
        store
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn load_icon(&self, font: &FontRenderer, item: &SavedItem) -> IconBitmap {
        if item.path.extension().is_some_and(|e| e.eq_ignore_ascii_case("png")) {
            match IconBitmap::from_png(&item.path) {
                Ok(icon) => return icon,
                Err(e) => warn!(path = %item.path.display(), error = %e, "icon decode failed, using placeholder"),
            }
        }
        IconBitmap::placeholder(font, &item.label, self.icon_side)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn set_active(&mut self, index: usize) {
        if index < self.categories.len() {
            self.active = index;
        }
    }

    pub fn active_items(&self) -> &[Item] {
        &self.categories[self.active].items
    }

    pub fn item_by_id(&self, id: u32) -> Option<&Item> {
        self.categories
            .iter()
            .flat_map(|c| c.items.iter())
            .find(|i| i.id == id)
    }

    /// Persisted snapshot, insertion order preserved
    pub fn to_saved(&self) -> Vec<SavedCategory> {
        self.categories
            .iter()
            .map(|c| SavedCategory {
                name: c.name.clone(),
                items: c.items.iter().map(|i| i.saved.clone()).collect(),
            })
            .collect()
    }

    pub fn add_category(&mut self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            anyhow::bail!("Category name cannot be empty");
        }
        if self.categories.iter().any(|c| c.name == name) {
            anyhow::bail!("Category '{}' already exists", name);
        }
        self.categories.push(Category {
            name: name.to_string(),
            items: Vec::new(),
        });
        Ok(())
    }

    pub fn rename_category(&mut self, index: usize, name: &str) -> Result<()> {
        let category = self
            .categories
            .get_mut(index)
            .context("No such category")?;
        if category.name == cfg::RESERVED_CATEGORY {
            anyhow::bail!("The '{}' category cannot be renamed", cfg::RESERVED_CATEGORY);
        }
        if name.trim().is_empty() {
            anyhow::bail!("Category name cannot be empty");
        }
        category.name = name.to_string();
        Ok(())
    }

    pub fn delete_category(&mut self, index: usize) -> Result<()> {
        let category = self.categories.get(index).context("No such category")?;
        if category.name == cfg::RESERVED_CATEGORY {
            anyhow::bail!("The '{}' category cannot be deleted", cfg::RESERVED_CATEGORY);
        }
        self.categories.remove(index);
        if self.active >= self.categories.len() {
            self.active = self.categories.len() - 1;
        }
        Ok(())
    }

    /// Add a dropped path to the active category. When `storage_dir` is
    /// given the file/directory is copied there first and the item owns
    /// the copy; the add aborts if the copy produces no valid destination.
    pub fn add_dropped(
        &mut self,
        font: &FontRenderer,
        source: &Path,
        storage_dir: Option<&Path>,
    ) -> Result<u32> {
        let label = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "item".to_string());

        let (resolved, owned) = match storage_dir {
            Some(dir) => {
                let dest = dir.join(source.file_name().context("Dropped path has no name")?);
                copy_tolerant(source, &dest)?;
                (dest, true)
            }
            None => (source.to_path_buf(), false),
        };

        Ok(self.add_prepared(
            font,
            SavedItem {
                label,
                path: resolved,
                original_path: source.to_path_buf(),
                owned_copy: owned,
            },
        ))
    }

    /// Register an item whose backing file is already in place, e.g. a
    /// drop copy finished on a worker thread
    pub fn add_prepared(&mut self, font: &FontRenderer, saved: SavedItem) -> u32 {
        let icon = self.load_icon(font, &saved);
        let id = self.allocate_id();
        self.categories[self.active].items.push(Item {
            id,
            saved,
            icon,
        });
        info!(id, "item added");
        id
    }

    pub fn rename_item(&mut self, id: u32, label: &str) -> Result<()> {
        let item = self
            .categories
            .iter_mut()
            .flat_map(|c| c.items.iter_mut())
            .find(|i| i.id == id)
            .context("No such item")?;
        if label.trim().is_empty() {
            anyhow::bail!("Item label cannot be empty");
        }
        item.saved.label = label.to_string();
        Ok(())
    }

    /// Remove the item; an owned copy is deleted from disk as well
    pub fn delete_item(&mut self, id: u32) -> Result<()> {
        for category in &mut self.categories {
            if let Some(pos) = category.items.iter().position(|i| i.id == id) {
                let item = category.items.remove(pos);
                if item.saved.owned_copy {
                    let path = &item.saved.path;
                    let result = if path.is_dir() {
                        fs::remove_dir_all(path)
                    } else {
                        fs::remove_file(path)
                    };
                    if let Err(e) = result {
                        // The item is already gone from the store; disk
                        // cleanup failure is reported but not fatal
                        warn!(path = %path.display(), error = %e, "failed to remove owned copy");
                        return Err(e).context(format!(
                            "Failed to remove owned copy at {}",
                            path.display()
                        ));
                    }
                }
                return Ok(());
            }
        }
        anyhow::bail!("No such item: {}", id)
    }
}

/// Copy a file or directory tree. Individual sub-file failures are logged
/// and skipped; the copy only fails when the destination root itself
/// cannot be produced.
pub fn copy_tolerant(source: &Path, dest: &Path) -> Result<()> {
    if source.is_dir() {
        fs::create_dir_all(dest)
            .with_context(|| format!("Failed to create directory {}", dest.display()))?;
        let entries = fs::read_dir(source)
            .with_context(|| format!("Failed to read directory {}", source.display()))?;
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(dir = %source.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let child_dest = dest.join(entry.file_name());
            if let Err(e) = copy_tolerant(&entry.path(), &child_dest) {
                warn!(path = %entry.path().display(), error = %e, "skipping file during copy");
            }
        }
        Ok(())
    } else {
        fs::copy(source, dest)
            .map(|_| ())
            .with_context(|| format!("Failed to copy {}", source.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn saved(label: &str, path: PathBuf) -> SavedItem {
        SavedItem {
            label: label.to_string(),
            path,
            original_path: PathBuf::from("/tmp/original"),
            owned_copy: false,
        }
    }

    #[test]
    fn normalize_inserts_reserved_category_first() {
        let out = normalize_layout(
            vec![SavedCategory {
                name: "Work".into(),
                items: Vec::new(),
            }],
            Vec::new(),
        );
        assert_eq!(out[0].name, cfg::RESERVED_CATEGORY);
        assert_eq!(out[1].name, "Work");
    }

    #[test]
    fn normalize_migrates_legacy_flat_list_into_reserved() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, b"x").unwrap();

        let out = normalize_layout(Vec::new(), vec![saved("doc", file.clone())]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, cfg::RESERVED_CATEGORY);
        assert_eq!(out[0].items.len(), 1);
        assert_eq!(out[0].items[0].path, file);
    }

    #[test]
    fn normalize_drops_missing_paths() {
        let dir = tempdir().unwrap();
        let alive = dir.path().join("alive.txt");
        fs::write(&alive, b"x").unwrap();

        let out = normalize_layout(
            vec![SavedCategory {
                name: cfg::RESERVED_CATEGORY.into(),
                items: vec![
                    saved("alive", alive.clone()),
                    saved("gone", dir.path().join("missing.txt")),
                ],
            }],
            Vec::new(),
        );
        assert_eq!(out[0].items.len(), 1);
        assert_eq!(out[0].items[0].label, "alive");
    }

    #[test]
    fn copy_tolerant_survives_bad_subentries() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();
        fs::write(src.join("nested/b.txt"), b"b").unwrap();
        // A dangling symlink copies as a file and fails; the rest continue
        #[cfg(unix)]
        std::os::unix::fs::symlink(dir.path().join("nowhere"), src.join("dangling")).unwrap();

        let dst = dir.path().join("dst");
        copy_tolerant(&src, &dst).unwrap();
        assert!(dst.join("a.txt").exists());
        assert!(dst.join("nested/b.txt").exists());
    }

    #[test]
    fn copy_tolerant_fails_when_root_is_invalid() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist.txt");
        let err = copy_tolerant(&missing, &dir.path().join("out.txt"));
        assert!(err.is_err());
    }

    fn store_with(names: &[&str]) -> ItemStore {
        let saved = names
            .iter()
            .map(|n| SavedCategory {
                name: n.to_string(),
                items: Vec::new(),
            })
            .collect();
        // Placeholder-only store; no font needed because there are no items
        ItemStore {
            categories: {
                let saved: Vec<SavedCategory> = saved;
                saved
                    .into_iter()
                    .map(|c| Category {
                        name: c.name,
                        items: Vec::new(),
                    })
                    .collect()
            },
            active: 0,
            next_id: 1,
            icon_side: 40,
        }
    }

    #[test]
    fn reserved_category_cannot_be_renamed_or_deleted() {
        let mut store = store_with(&[cfg::RESERVED_CATEGORY, "Work"]);
        assert!(store.rename_category(0, "Other").is_err());
        assert!(store.delete_category(0).is_err());
        assert!(store.rename_category(1, "Play").is_ok());
        assert!(store.delete_category(1).is_ok());
    }

    #[test]
    fn duplicate_category_names_are_rejected() {
        let mut store = store_with(&[cfg::RESERVED_CATEGORY]);
        store.add_category("Work").unwrap();
        assert!(store.add_category("Work").is_err());
        assert!(store.add_category("").is_err());
    }

    #[test]
    fn deleting_active_tail_category_moves_active_back() {
        let mut store = store_with(&[cfg::RESERVED_CATEGORY, "Work"]);
        store.set_active(1);
        store.delete_category(1).unwrap();
        assert_eq!(store.active_index(), 0);
    }

    #[test]
    fn item_ids_are_never_reused() {
        let font = match FontRenderer::from_system_font(12.0) {
            Ok(f) => f,
            // No fonts in minimal CI images; id allocation is what matters
            Err(_) => return,
        };
        let dir = tempdir().unwrap();
        let file = dir.path().join("one.txt");
        fs::write(&file, b"x").unwrap();

        let mut store = ItemStore::from_saved(
            normalize_layout(Vec::new(), Vec::new()),
            &font,
            40,
        );
        let a = store.add_dropped(&font, &file, None).unwrap();
        store.delete_item(a).unwrap();
        let b = store.add_dropped(&font, &file, None).unwrap();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn add_dropped_with_storage_dir_copies_and_owns() {
        let font = match FontRenderer::from_system_font(12.0) {
            Ok(f) => f,
            Err(_) => return,
        };
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, b"hello").unwrap();
        let storage = dir.path().join("storage");
        fs::create_dir_all(&storage).unwrap();

        let mut store =
            ItemStore::from_saved(normalize_layout(Vec::new(), Vec::new()), &font, 40);
        let id = store.add_dropped(&font, &file, Some(&storage)).unwrap();
        let item = store.item_by_id(id).unwrap();
        assert!(item.saved.owned_copy);
        assert_eq!(item.saved.path, storage.join("doc.txt"));
        assert!(item.saved.path.exists());
        assert_eq!(item.saved.original_path, file);

        // Deleting removes the owned copy from disk
        store.delete_item(id).unwrap();
        assert!(!storage.join("doc.txt").exists());
    }

    #[test]
    fn add_dropped_aborts_when_copy_root_fails() {
        let font = match FontRenderer::from_system_font(12.0) {
            Ok(f) => f,
            Err(_) => return,
        };
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let storage = dir.path().join("storage");
        fs::create_dir_all(&storage).unwrap();

        let mut store =
            ItemStore::from_saved(normalize_layout(Vec::new(), Vec::new()), &font, 40);
        assert!(store.add_dropped(&font, &missing, Some(&storage)).is_err());
        assert!(store.active_items().is_empty());
    }
}
