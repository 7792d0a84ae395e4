use crate::error::{Result, SyncError};
use crate::notes::note::{is_truthy, SLUG_KEY};
use crate::notes::TransformOptions;
use crate::sync::images::ImageMatch;
use crate::watch::CoalescerConfig;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable names - single source of truth
pub mod env_vars {
    /// Path to the TOML config file
    pub const CONFIG_FILE: &str = "VAULT_SYNC_CONFIG";
    pub const VAULT_PATH: &str = "VAULT_PATH";
    pub const VAULT_NOTES_PATH: &str = "VAULT_NOTES_PATH";
    pub const VAULT_IMAGES_PATH: &str = "VAULT_IMAGES_PATH";
    pub const ASTRO_NOTES_PATH: &str = "ASTRO_NOTES_PATH";
    pub const ASTRO_IMAGES_PATH: &str = "ASTRO_IMAGES_PATH";
    pub const REPLACE_FILE_SYSTEM_IMAGE_SRC: &str = "REPLACE_FILE_SYSTEM_IMAGE_SRC";
    pub const LINK_BASE: &str = "LINK_BASE";
    /// "substring" or "token"
    pub const IMAGE_MATCH: &str = "IMAGE_MATCH";
    /// Set to 0 to handle every watcher event immediately
    pub const DEBOUNCE_MS: &str = "DEBOUNCE_MS";
}

/// Default values
pub mod defaults {
    pub const CONFIG_FILE: &str = "vault-sync.toml";
    pub const NOTES_SUBDIR: &str = "notes";
    pub const IMAGES_SUBDIR: &str = "images";
    pub const LINK_BASE: &str = "/";
    pub const DEBOUNCE_MS: u64 = 250;
    pub const MAX_WAIT_MS: u64 = 2000;
}

/// Raw contents of `vault-sync.toml`; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub vault_path: Option<PathBuf>,
    pub vault_notes_path: Option<PathBuf>,
    pub vault_images_path: Option<PathBuf>,
    pub astro_notes_path: Option<PathBuf>,
    pub astro_images_path: Option<PathBuf>,
    pub replace_file_system_image_src: Option<bool>,
    pub link_base: Option<String>,
    pub image_match: Option<ImageMatch>,
    /// Frontmatter renames, e.g. `tags = "categories"`, kept in file order
    #[serde(deserialize_with = "ordered_renames")]
    pub field_renames: Vec<(String, String)>,
    pub debounce_ms: Option<u64>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
        toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Resolved configuration for a sync run
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Vault root, also the prefix stripped from `file://` media references
    pub vault_path: PathBuf,
    pub vault_notes_path: PathBuf,
    pub vault_images_path: PathBuf,
    pub astro_notes_path: PathBuf,
    pub astro_images_path: PathBuf,
    pub replace_file_system_image_src: bool,
    pub link_base: String,
    pub image_match: ImageMatch,
    pub field_renames: Vec<(String, String)>,
    pub debounce_ms: u64,
}

impl SyncConfig {
    /// Load from the optional TOML file, then apply environment overrides
    pub fn load() -> Result<Self> {
        let file = match config_file_path() {
            Some(path) => {
                log::info!("[CONFIG] Reading {}", path.display());
                FileConfig::from_file(&path)?
            }
            None => FileConfig::default(),
        };

        Self::resolve(file, |key| env::var(key).ok())
    }

    /// Merge file values with environment overrides (`lookup`) and defaults
    pub fn resolve(file: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path_var = |key: &str, fallback: Option<PathBuf>| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .or(fallback)
        };

        let vault_path = path_var(env_vars::VAULT_PATH, file.vault_path)
            .ok_or_else(|| required(env_vars::VAULT_PATH, "vault_path"))?;
        let vault_notes_path = path_var(env_vars::VAULT_NOTES_PATH, file.vault_notes_path)
            .unwrap_or_else(|| vault_path.join(defaults::NOTES_SUBDIR));
        let vault_images_path = path_var(env_vars::VAULT_IMAGES_PATH, file.vault_images_path)
            .unwrap_or_else(|| vault_path.join(defaults::IMAGES_SUBDIR));
        let astro_notes_path = path_var(env_vars::ASTRO_NOTES_PATH, file.astro_notes_path)
            .ok_or_else(|| required(env_vars::ASTRO_NOTES_PATH, "astro_notes_path"))?;
        let astro_images_path = path_var(env_vars::ASTRO_IMAGES_PATH, file.astro_images_path)
            .ok_or_else(|| required(env_vars::ASTRO_IMAGES_PATH, "astro_images_path"))?;

        let replace_file_system_image_src = lookup(env_vars::REPLACE_FILE_SYSTEM_IMAGE_SRC)
            .map(|v| is_truthy(&v))
            .or(file.replace_file_system_image_src)
            .unwrap_or(false);

        let link_base = lookup(env_vars::LINK_BASE)
            .or(file.link_base)
            .unwrap_or_else(|| defaults::LINK_BASE.to_string());

        let image_match = match lookup(env_vars::IMAGE_MATCH) {
            Some(v) => ImageMatch::from_str(v.trim()).map_err(|_| {
                SyncError::Config(format!(
                    "{} must be \"substring\" or \"token\", got {:?}",
                    env_vars::IMAGE_MATCH,
                    v
                ))
            })?,
            None => file.image_match.unwrap_or_default(),
        };

        let debounce_ms = match lookup(env_vars::DEBOUNCE_MS) {
            Some(v) => v.trim().parse().map_err(|_| {
                SyncError::Config(format!("{} must be a number, got {:?}", env_vars::DEBOUNCE_MS, v))
            })?,
            None => file.debounce_ms.unwrap_or(defaults::DEBOUNCE_MS),
        };

        Ok(Self {
            vault_path,
            vault_notes_path,
            vault_images_path,
            astro_notes_path,
            astro_images_path,
            replace_file_system_image_src,
            link_base: normalize_link_base(&link_base),
            image_match,
            field_renames: file.field_renames,
            debounce_ms,
        })
    }

    /// Check that the vault directories exist and the renames are usable.
    /// Output directories are created on demand and not checked here.
    pub fn validate(&self) -> Result<()> {
        for dir in [&self.vault_notes_path, &self.vault_images_path] {
            if !dir.is_dir() {
                return Err(SyncError::MissingDirectory(dir.clone()));
            }
            std::fs::read_dir(dir).map_err(|e| SyncError::io(dir, e))?;
        }

        for (from, to) in &self.field_renames {
            if from == SLUG_KEY || to == SLUG_KEY {
                return Err(SyncError::Config(format!(
                    "field_renames cannot rename to or from \"{}\" ({} -> {})",
                    SLUG_KEY, from, to
                )));
            }
        }

        Ok(())
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            link_base: self.link_base.clone(),
            replace_file_system_image_src: self.replace_file_system_image_src,
            vault_path: self.vault_path.to_string_lossy().to_string(),
            field_renames: self.field_renames.clone(),
        }
    }

    pub fn coalescer_config(&self) -> CoalescerConfig {
        CoalescerConfig {
            debounce_ms: self.debounce_ms,
            max_wait_ms: defaults::MAX_WAIT_MS.max(self.debounce_ms),
            enabled: self.debounce_ms > 0,
        }
    }
}

/// Config file from VAULT_SYNC_CONFIG, or ./vault-sync.toml if it exists
fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(env_vars::CONFIG_FILE) {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from(defaults::CONFIG_FILE);
    if default.exists() { Some(default) } else { None }
}

fn required(env_var: &str, field: &str) -> SyncError {
    SyncError::Config(format!(
        "{} is not set (env {} or `{}` in {})",
        field,
        env_var,
        field,
        defaults::CONFIG_FILE
    ))
}

/// Collect a `from = "to"` table as pairs in document order.
/// Renames apply one after another, so `a = "b"` then `b = "c"` chains.
fn ordered_renames<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct RenameVisitor;

    impl<'de> Visitor<'de> for RenameVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a table of `from = \"to\"` field renames")
        }

        fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> std::result::Result<Self::Value, M::Error> {
            let mut renames = Vec::new();
            while let Some((from, to)) = map.next_entry::<String, String>()? {
                renames.push((from, to));
            }
            Ok(renames)
        }
    }

    deserializer.deserialize_map(RenameVisitor)
}

/// Links are built as `<link_base><slug>/`, so the base must end in `/`
fn normalize_link_base(base: &str) -> String {
    let base = base.trim();
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    }
}
