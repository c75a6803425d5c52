//! Plugin catalog and registry.
//!
//! The catalog lives at `<plugin_root>/catalog.json`. Loading validates every
//! entry (id charset, paths contained in the root, files readable) and
//! replaces the registry contents only if all entries pass.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::{OnceLock, RwLock};

use bytes::Bytes;
use regex::Regex;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use sdn_license_core::{decode_key32, scopes::SCOPE_BASE, DEFAULT_KEY_DECODERS};

use crate::bundle::decrypt_bundle;
use crate::crypto::X25519StaticSecret;
use crate::error::{KeysError, Result};
use crate::staged::unwrap_staged_artifact;
use crate::upload::{bundle_sha256, PluginUpload};

/// Catalog file name inside the plugin root.
pub const CATALOG_FILE: &str = "catalog.json";
/// File name for uploaded bundles, under `<root>/<id>/`.
pub const UPLOAD_BUNDLE_FILE: &str = "bundle.wasm";
pub const DEFAULT_CONTENT_TYPE: &str = "application/wasm";
pub const DEFAULT_CACHE_CONTROL: &str =
    "public, max-age=300, s-maxage=3600, stale-while-revalidate=86400";

static PLUGIN_ID_PATTERN: OnceLock<Regex> = OnceLock::new();

fn plugin_id_pattern() -> &'static Regex {
    PLUGIN_ID_PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid plugin id pattern"))
}

/// Check a plugin id against the allowed charset.
pub fn is_valid_plugin_id(id: &str) -> bool {
    plugin_id_pattern().is_match(id)
}

/// Resolve `relative` under `root`, rejecting anything that could escape it.
pub fn resolve_relative_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative = relative.trim();
    if relative.is_empty() {
        return Err(KeysError::Catalog("path is empty".into()));
    }
    let rel = Path::new(relative);
    let mut resolved = root.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => {
                return Err(KeysError::Catalog(format!(
                    "path escapes plugin root: {}",
                    relative
                )))
            }
        }
    }
    if resolved == root {
        return Err(KeysError::Catalog(format!("path names the plugin root: {}", relative)));
    }
    Ok(resolved)
}

/// Read `path` after following symlinks, refusing targets outside `root`.
fn read_contained(root: &Path, path: &Path) -> Result<Vec<u8>> {
    let canonical_root = root.canonicalize()?;
    let target = path.canonicalize()?;
    if !target.starts_with(&canonical_root) {
        tracing::warn!(path = %path.display(), "plugin file resolves outside the plugin root");
        return Err(KeysError::Catalog(format!(
            "path escapes plugin root: {}",
            path.display()
        )));
    }
    Ok(std::fs::read(target)?)
}

// ─────────────────────────────────────────────────────────────────────────
// catalog.json
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub plugins: Vec<CatalogEntry>,
}

/// One plugin as written in `catalog.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub required_scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_pubkey_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<i64>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────
// Assets
// ─────────────────────────────────────────────────────────────────────────

/// Where a plugin's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    /// Served as stored.
    Plain { path: PathBuf },
    /// Stored encrypted; the content key sits next to it.
    Encrypted { encrypted_path: PathBuf, key_path: PathBuf },
}

impl StorageMode {
    fn served_path(&self) -> &Path {
        match self {
            StorageMode::Plain { path } => path,
            StorageMode::Encrypted { encrypted_path, .. } => encrypted_path,
        }
    }
}

/// Publisher signature recorded for uploaded plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub signature_hex: String,
    pub signer_pubkey_hex: String,
    pub uploaded_at: i64,
}

/// A validated catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginAsset {
    pub id: String,
    pub version: String,
    pub required_scope: String,
    pub content_type: String,
    pub cache_control: String,
    /// Lowercase hex SHA-256 of the served bytes.
    pub bundle_sha256: String,
    pub size: u64,
    pub storage: StorageMode,
    pub upload: Option<UploadRecord>,
    entry: CatalogEntry,
}

impl PluginAsset {
    /// Validate `entry` against `root` and hash the served file.
    pub fn from_entry(root: &Path, entry: CatalogEntry) -> Result<Self> {
        let id = entry.id.trim().to_string();
        if !is_valid_plugin_id(&id) {
            return Err(KeysError::Catalog(format!("invalid plugin id: {:?}", entry.id)));
        }
        let version = entry.version.trim().to_string();
        if version.is_empty() {
            return Err(KeysError::Catalog(format!("plugin {} has no version", id)));
        }

        let storage = match (
            non_empty(&entry.encrypted_path),
            non_empty(&entry.key_path),
            non_empty(&entry.plain_path),
        ) {
            (Some(enc), Some(key), None) => StorageMode::Encrypted {
                encrypted_path: resolve_relative_path(root, enc)?,
                key_path: resolve_relative_path(root, key)?,
            },
            (None, None, Some(plain)) => StorageMode::Plain {
                path: resolve_relative_path(root, plain)?,
            },
            (Some(_), None, _) => {
                return Err(KeysError::Catalog(format!("plugin {} missing key_path", id)))
            }
            _ => {
                return Err(KeysError::Catalog(format!(
                    "plugin {} needs either encrypted_path + key_path or plain_path",
                    id
                )))
            }
        };

        let data = read_contained(root, storage.served_path()).map_err(|e| {
            KeysError::Catalog(format!(
                "plugin {}: cannot read {}: {}",
                id,
                storage.served_path().display(),
                e
            ))
        })?;
        if let StorageMode::Encrypted { key_path, .. } = &storage {
            read_contained(root, key_path).map_err(|e| {
                KeysError::Catalog(format!(
                    "plugin {}: cannot read {}: {}",
                    id,
                    key_path.display(),
                    e
                ))
            })?;
        }

        let upload = match (non_empty(&entry.signature_hex), non_empty(&entry.signer_pubkey_hex)) {
            (Some(sig), Some(signer)) => Some(UploadRecord {
                signature_hex: sig.to_string(),
                signer_pubkey_hex: signer.to_string(),
                uploaded_at: entry.uploaded_at.unwrap_or_default(),
            }),
            _ => None,
        };

        let required_scope = match entry.required_scope.trim() {
            "" => SCOPE_BASE.to_string(),
            scope => scope.to_string(),
        };

        Ok(Self {
            content_type: non_empty(&entry.content_type)
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
            cache_control: non_empty(&entry.cache_control)
                .unwrap_or(DEFAULT_CACHE_CONTROL)
                .to_string(),
            bundle_sha256: bundle_sha256(&data),
            size: data.len() as u64,
            id,
            version,
            required_scope,
            storage,
            upload,
            entry,
        })
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.storage, StorageMode::Encrypted { .. })
    }

    /// Entity tag for the served bytes.
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.bundle_sha256)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Public views
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    #[default]
    Stopped,
    Running,
    Error,
}

/// Whether the node is currently running a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub state: RuntimeState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl RuntimeStatus {
    pub fn running() -> Self {
        Self {
            state: RuntimeState::Running,
            message: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            state: RuntimeState::Error,
            message: message.into(),
        }
    }
}

/// Manifest entry: everything about a plugin except where it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub version: String,
    pub required_scope: String,
    pub content_type: String,
    pub cache_control: String,
    pub bundle_sha256: String,
    pub size: u64,
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_pubkey_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<i64>,
    pub runtime: RuntimeStatus,
}

/// Served bundle bytes with their caching metadata.
#[derive(Debug, Clone)]
pub struct BundleBytes {
    pub data: Bytes,
    pub etag: String,
    pub content_type: String,
    pub cache_control: String,
}

// ─────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────

/// In-memory view of the plugin catalog.
pub struct PluginRegistry {
    root: PathBuf,
    node_secret: Option<X25519StaticSecret>,
    assets: RwLock<BTreeMap<String, PluginAsset>>,
    runtime: RwLock<HashMap<String, RuntimeStatus>>,
}

fn poisoned() -> KeysError {
    KeysError::Catalog("registry lock poisoned".into())
}

impl PluginRegistry {
    /// Open the registry at `root` and load its catalog.
    pub fn open(root: impl Into<PathBuf>, node_secret: Option<X25519StaticSecret>) -> Result<Self> {
        let registry = Self {
            root: root.into(),
            node_secret,
            assets: RwLock::new(BTreeMap::new()),
            runtime: RwLock::new(HashMap::new()),
        };
        registry.load()?;
        Ok(registry)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reload `catalog.json`. A missing file yields an empty registry; any
    /// invalid entry leaves the current contents untouched.
    pub fn load(&self) -> Result<usize> {
        let path = self.root.join(CATALOG_FILE);
        let file = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice::<CatalogFile>(&raw)
                .map_err(|e| KeysError::Catalog(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CatalogFile::default(),
            Err(e) => return Err(e.into()),
        };

        let mut loaded = BTreeMap::new();
        for entry in file.plugins {
            let asset = PluginAsset::from_entry(&self.root, entry)?;
            if loaded.contains_key(&asset.id) {
                return Err(KeysError::Catalog(format!("duplicate plugin id: {}", asset.id)));
            }
            loaded.insert(asset.id.clone(), asset);
        }

        let count = loaded.len();
        *self.assets.write().map_err(|_| poisoned())? = loaded;
        tracing::info!(root = %self.root.display(), plugins = count, "plugin catalog loaded");
        Ok(count)
    }

    pub fn count(&self) -> usize {
        self.assets.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn get(&self, id: &str) -> Option<PluginAsset> {
        self.assets.read().ok()?.get(id).cloned()
    }

    /// Public descriptors sorted by id.
    pub fn list_public(&self) -> Result<Vec<PluginDescriptor>> {
        let assets = self.assets.read().map_err(|_| poisoned())?;
        let runtime = self.runtime.read().map_err(|_| poisoned())?;
        Ok(assets
            .values()
            .map(|asset| PluginDescriptor {
                id: asset.id.clone(),
                version: asset.version.clone(),
                required_scope: asset.required_scope.clone(),
                content_type: asset.content_type.clone(),
                cache_control: asset.cache_control.clone(),
                bundle_sha256: asset.bundle_sha256.clone(),
                size: asset.size,
                encrypted: asset.is_encrypted(),
                signature_hex: asset.upload.as_ref().map(|u| u.signature_hex.clone()),
                signer_pubkey_hex: asset.upload.as_ref().map(|u| u.signer_pubkey_hex.clone()),
                uploaded_at: asset.upload.as_ref().map(|u| u.uploaded_at),
                runtime: runtime.get(&asset.id).cloned().unwrap_or_default(),
            })
            .collect())
    }

    fn require(&self, id: &str) -> Result<PluginAsset> {
        self.get(id).ok_or_else(|| KeysError::NotFound(id.to_string()))
    }

    /// Read the bytes served to clients.
    pub fn read_bundle(&self, id: &str) -> Result<BundleBytes> {
        let asset = self.require(id)?;
        let data = read_contained(&self.root, asset.storage.served_path())?;
        Ok(BundleBytes {
            etag: asset.etag(),
            content_type: asset.content_type,
            cache_control: asset.cache_control,
            data: Bytes::from(data),
        })
    }

    /// Decrypt a plugin for local execution. Plain assets pass through.
    pub fn decrypt_bundle(&self, id: &str) -> Result<Zeroizing<Vec<u8>>> {
        let asset = self.require(id)?;
        let data = read_contained(&self.root, asset.storage.served_path())?;
        match asset.storage {
            StorageMode::Plain { .. } => Ok(Zeroizing::new(data)),
            StorageMode::Encrypted { .. } => decrypt_bundle(&data, self.node_secret.as_ref()),
        }
    }

    /// Read the 32-byte content key of an encrypted plugin.
    ///
    /// The key file may hold hex or base64 text, or the raw 32 bytes.
    pub fn read_bundle_key(&self, id: &str) -> Result<Zeroizing<[u8; 32]>> {
        let asset = self.require(id)?;
        let key_path = match &asset.storage {
            StorageMode::Encrypted { key_path, .. } => key_path,
            StorageMode::Plain { .. } => {
                return Err(KeysError::InvalidKey(format!("plugin {} is not encrypted", id)))
            }
        };

        let raw = Zeroizing::new(read_contained(&self.root, key_path)?);
        if let Ok(text) = std::str::from_utf8(&raw) {
            if let Ok(key) = decode_key32(text, DEFAULT_KEY_DECODERS) {
                return Ok(key);
            }
        }
        if raw.len() == 32 {
            let mut key = Zeroizing::new([0u8; 32]);
            key.copy_from_slice(&raw);
            return Ok(key);
        }
        Err(KeysError::InvalidKey(format!(
            "bundle key for {} must be 32 bytes (hex, base64 or raw)",
            id
        )))
    }

    /// Decrypt a staged artifact from the key server with the node key.
    pub fn unwrap_staged(&self, json: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let node_secret = self
            .node_secret
            .as_ref()
            .ok_or_else(|| KeysError::InvalidKey("node x25519 key not configured".into()))?;
        unwrap_staged_artifact(json, node_secret)
    }

    pub fn runtime_status(&self, id: &str) -> RuntimeStatus {
        self.runtime
            .read()
            .ok()
            .and_then(|m| m.get(id).cloned())
            .unwrap_or_default()
    }

    pub fn set_runtime_status(&self, id: &str, status: RuntimeStatus) -> Result<()> {
        self.runtime
            .write()
            .map_err(|_| poisoned())?
            .insert(id.to_string(), status);
        Ok(())
    }

    /// Verify and store an uploaded plugin, then rewrite the catalog.
    ///
    /// On any failure the previous bundle file, registry entry and catalog
    /// are restored.
    pub fn add_plugin(&self, upload: &PluginUpload, now: i64) -> Result<PluginAsset> {
        let id = upload.id.trim();
        if !is_valid_plugin_id(id) {
            return Err(KeysError::Catalog(format!("invalid plugin id: {:?}", upload.id)));
        }
        let sha = upload.verify()?;

        let relative = format!("{}/{}", id, UPLOAD_BUNDLE_FILE);
        let bundle_path = resolve_relative_path(&self.root, &relative)?;
        let dir = self.root.join(id);
        std::fs::create_dir_all(&dir)?;

        let staging = dir.join(format!("{}.upload", UPLOAD_BUNDLE_FILE));
        let backup = dir.join(format!("{}.prev", UPLOAD_BUNDLE_FILE));
        std::fs::write(&staging, &upload.bundle)?;

        let entry = CatalogEntry {
            id: id.to_string(),
            version: upload.version.trim().to_string(),
            required_scope: upload.required_scope.trim().to_string(),
            plain_path: Some(relative),
            content_type: upload.content_type.clone(),
            signature_hex: Some(upload.signature_hex.trim().to_lowercase()),
            signer_pubkey_hex: Some(upload.signer_pubkey_hex.trim().to_lowercase()),
            uploaded_at: Some(now),
            ..CatalogEntry::default()
        };

        let mut assets = self.assets.write().map_err(|_| poisoned())?;
        let had_previous = bundle_path.exists();
        if had_previous {
            std::fs::rename(&bundle_path, &backup)?;
        }

        let result = std::fs::rename(&staging, &bundle_path)
            .map_err(KeysError::from)
            .and_then(|_| PluginAsset::from_entry(&self.root, entry))
            .and_then(|asset| {
                if asset.bundle_sha256 != sha {
                    return Err(KeysError::Catalog("stored bundle hash changed".into()));
                }
                let previous = assets.insert(asset.id.clone(), asset.clone());
                match save_catalog(&self.root, &assets) {
                    Ok(()) => Ok(asset),
                    Err(e) => {
                        match previous {
                            Some(prev) => assets.insert(prev.id.clone(), prev),
                            None => assets.remove(&asset.id),
                        };
                        Err(e)
                    }
                }
            });

        match result {
            Ok(asset) => {
                if had_previous {
                    let _ = std::fs::remove_file(&backup);
                }
                tracing::info!(plugin = %asset.id, version = %asset.version, sha256 = %asset.bundle_sha256, "plugin uploaded");
                Ok(asset)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&staging);
                if had_previous {
                    let _ = std::fs::rename(&backup, &bundle_path);
                } else {
                    let _ = std::fs::remove_file(&bundle_path);
                }
                tracing::warn!(plugin = %id, error = %e, "plugin upload rolled back");
                Err(e)
            }
        }
    }
}

fn save_catalog(root: &Path, assets: &BTreeMap<String, PluginAsset>) -> Result<()> {
    let file = CatalogFile {
        plugins: assets.values().map(|a| a.entry.clone()).collect(),
    };
    let json = serde_json::to_vec_pretty(&file)
        .map_err(|e| KeysError::SerializationError(e.to_string()))?;
    let path = root.join(CATALOG_FILE);
    let tmp = root.join(format!("{}.tmp", CATALOG_FILE));
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("root", &self.root)
            .field("plugins", &self.count())
            .field("node_key", &self.node_secret.is_some())
            .finish()
    }
}
