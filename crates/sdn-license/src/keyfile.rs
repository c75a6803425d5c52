//! On-disk key material.
//!
//! The token signing key is a 32-byte Ed25519 seed (a 64-byte `seed || public`
//! file is also accepted). It is created on first start with mode 0600 inside
//! a 0700 directory, and refused if group or other can read it.

use std::fs;
use std::io::Write;
use std::path::Path;

use zeroize::Zeroizing;

use sdn_license_core::{decode_key32, Keypair, DEFAULT_KEY_DECODERS};
use sdn_license_keys::X25519StaticSecret;

use crate::error::{LicenseError, Result};

#[cfg(unix)]
fn check_private(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)?.permissions().mode();
    if mode & 0o077 != 0 {
        return Err(LicenseError::KeyFile(format!(
            "{} is accessible by group or others (mode {:o}); chmod 600 it",
            path.display(),
            mode & 0o777
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_private(_path: &Path) -> Result<()> {
    Ok(())
}

fn create_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

/// Load the token signing key at `path`, generating it if absent.
pub fn load_or_create_signing_key(path: &Path) -> Result<Keypair> {
    match fs::read(path) {
        Ok(raw) => {
            let raw = Zeroizing::new(raw);
            check_private(path)?;
            let keypair = match raw.len() {
                32 => {
                    let mut seed = Zeroizing::new([0u8; 32]);
                    seed.copy_from_slice(&raw);
                    Keypair::from_seed(&seed)
                }
                64 => {
                    let mut bytes = Zeroizing::new([0u8; 64]);
                    bytes.copy_from_slice(&raw);
                    Keypair::from_keypair_bytes(&bytes)?
                }
                n => {
                    return Err(LicenseError::KeyFile(format!(
                        "{}: expected 32 or 64 bytes, got {}",
                        path.display(),
                        n
                    )))
                }
            };
            tracing::debug!(path = %path.display(), "loaded token signing key");
            Ok(keypair)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                create_private_dir(parent)?;
            }
            let keypair = Keypair::generate();
            write_private(path, keypair.seed().as_ref())?;
            tracing::info!(path = %path.display(), peer_id = %keypair.peer_id(), "generated token signing key");
            Ok(keypair)
        }
        Err(e) => Err(e.into()),
    }
}

/// Load the node's X25519 inventory key: hex or base64 text, or 32 raw bytes.
pub fn load_node_x25519_key(path: &Path) -> Result<X25519StaticSecret> {
    let raw = Zeroizing::new(fs::read(path)?);
    check_private(path)?;

    if let Ok(text) = std::str::from_utf8(&raw) {
        if let Ok(key) = decode_key32(text, DEFAULT_KEY_DECODERS) {
            return Ok(X25519StaticSecret::from_bytes(*key));
        }
    }
    if raw.len() == 32 {
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&raw);
        return Ok(X25519StaticSecret::from_bytes(*key));
    }
    Err(LicenseError::KeyFile(format!(
        "{}: node x25519 key must be 32 bytes (hex, base64 or raw)",
        path.display()
    )))
}
