//! Protected database unlocking
//!
//! The host application ships its library as a SQLCipher 4 file. Each page
//! is AES-256-CBC encrypted and ends in a reserved area holding the page IV
//! and an HMAC-SHA512 over the ciphertext, the IV and the little-endian page
//! number. The first 16 bytes of the file are the KDF salt, in place of the
//! plaintext SQLite header.
//!
//! [`Unlocker`] decrypts such a file into a plain SQLite copy in a cache
//! directory. The copy is reused while the source file's length and
//! modification time are unchanged. Files that already carry the SQLite
//! header are opened as they are.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::persistence::atomic_write;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha512 = Hmac<Sha512>;

/// Header of a plaintext SQLite file
pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const HMAC_LEN: usize = 64;
const HMAC_SALT_MASK: u8 = 0x3a;
const HMAC_KDF_ITER: u32 = 2;
const MIN_PAGE_SIZE: usize = 512;
const MAX_PAGE_SIZE: usize = 65536;

/// Cipher settings of a protected file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    /// PBKDF2 iterations for the page key
    pub kdf_iter: u32,
    /// Page size in bytes
    pub page_size: usize,
}

impl Default for CipherParams {
    fn default() -> Self {
        Self {
            kdf_iter: 256_000,
            page_size: 4096,
        }
    }
}

impl CipherParams {
    /// Bytes reserved at the end of each page for IV and HMAC
    pub fn reserve(&self) -> usize {
        IV_LEN + HMAC_LEN
    }

    /// Reject settings no protected file can have
    ///
    /// Pages must be a power of two between 512 and 65536 bytes, as in
    /// SQLite, and the key needs at least one KDF iteration.
    pub fn validate(&self) -> Result<()> {
        if !self.page_size.is_power_of_two() || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(Error::Decryption(format!(
                "page size {} is not a power of two in {MIN_PAGE_SIZE}..={MAX_PAGE_SIZE}",
                self.page_size
            )));
        }
        if self.kdf_iter == 0 {
            return Err(Error::Decryption("KDF iteration count must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Whether the file starts with the plaintext SQLite header
pub fn is_plaintext(path: &Path) -> Result<bool> {
    let mut file = File::open(path).map_err(|e| Error::from_io_read(e, path.to_path_buf()))?;
    let mut header = [0u8; 16];
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header == SQLITE_HEADER),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(Error::from_io_read(e, path.to_path_buf())),
    }
}

/// Page encryption and authentication keys
pub(crate) struct PageKeys {
    pub(crate) cipher: [u8; KEY_LEN],
    pub(crate) mac: [u8; KEY_LEN],
}

pub(crate) fn derive_keys(passphrase: &str, salt: &[u8], params: &CipherParams) -> PageKeys {
    let mut cipher = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha512>(passphrase.as_bytes(), salt, params.kdf_iter, &mut cipher);

    let mac_salt: Vec<u8> = salt.iter().map(|b| b ^ HMAC_SALT_MASK).collect();
    let mut mac = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha512>(&cipher, &mac_salt, HMAC_KDF_ITER, &mut mac);

    PageKeys { cipher, mac }
}

pub(crate) fn page_mac(key: &[u8], ciphertext_and_iv: &[u8], page_no: u32) -> Result<HmacSha512> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(key)
        .map_err(|e| Error::Decryption(format!("invalid HMAC key: {e}")))?;
    mac.update(ciphertext_and_iv);
    mac.update(&page_no.to_le_bytes());
    Ok(mac)
}

/// Decrypt a whole protected file image into a plaintext SQLite image
pub fn decrypt(data: &[u8], passphrase: &str, params: &CipherParams) -> Result<Vec<u8>> {
    params.validate()?;
    let page_size = params.page_size;
    let reserve = params.reserve();

    if data.len() < page_size || data.len() % page_size != 0 {
        return Err(Error::Decryption(format!(
            "file size {} is not a multiple of the {} byte page size",
            data.len(),
            page_size
        )));
    }

    let keys = derive_keys(passphrase, &data[..SALT_LEN], params);
    let mut out = Vec::with_capacity(data.len());

    for (index, page) in data.chunks_exact(page_size).enumerate() {
        let page_no = u32::try_from(index + 1)
            .map_err(|_| Error::Decryption("page number overflow".to_string()))?;
        let offset = if page_no == 1 { SALT_LEN } else { 0 };
        let body_end = page_size - reserve;

        let iv = &page[body_end..body_end + IV_LEN];
        let tag = &page[body_end + IV_LEN..body_end + IV_LEN + HMAC_LEN];

        page_mac(&keys.mac, &page[offset..body_end + IV_LEN], page_no)?
            .verify_slice(tag)
            .map_err(|_| {
                Error::Decryption(format!("HMAC check failed on page {page_no}; wrong key?"))
            })?;

        let mut body = page[offset..body_end].to_vec();
        Aes256CbcDec::new_from_slices(&keys.cipher, iv)
            .map_err(|e| Error::Decryption(format!("invalid cipher key: {e}")))?
            .decrypt_padded_mut::<NoPadding>(&mut body)
            .map_err(|e| Error::Decryption(format!("page {page_no}: {e}")))?;

        if page_no == 1 {
            out.extend_from_slice(SQLITE_HEADER);
        }
        out.extend_from_slice(&body);
        out.resize(out.len() + reserve, 0);
    }

    Ok(out)
}

/// Source file identity recorded next to a cached copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CacheStamp {
    source: PathBuf,
    len: u64,
    modified: u64,
}

impl CacheStamp {
    fn of(source: &Path) -> Result<Self> {
        let meta = fs::metadata(source).map_err(|e| Error::from_io_read(e, source.to_path_buf()))?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Ok(Self {
            source: source.to_path_buf(),
            len: meta.len(),
            modified,
        })
    }
}

/// Result of unlocking a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unlocked {
    /// Plaintext file to open
    pub path: PathBuf,
    /// Whether an earlier decrypted copy was reused
    pub reused: bool,
}

/// Decrypts protected files into a cache directory
#[derive(Debug, Clone)]
pub struct Unlocker {
    cache_dir: PathBuf,
    key: String,
    params: CipherParams,
}

impl Unlocker {
    pub fn new(cache_dir: impl Into<PathBuf>, key: impl Into<String>, params: CipherParams) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            key: key.into(),
            params,
        }
    }

    /// Location of the decrypted copy of `source`
    pub fn cache_path(&self, source: &Path) -> PathBuf {
        let canonical = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.cache_dir.join(format!("unlocked-{hex}.db"))
    }

    fn stamp_path(cache_path: &Path) -> PathBuf {
        cache_path.with_extension("json")
    }

    /// Produce a plaintext file for `source`
    ///
    /// The source file is only ever read.
    pub fn unlock(&self, source: &Path) -> Result<Unlocked> {
        if is_plaintext(source)? {
            debug!("{:?} is not encrypted, opening in place", source);
            return Ok(Unlocked {
                path: source.to_path_buf(),
                reused: false,
            });
        }

        self.params.validate()?;
        let cache_path = self.cache_path(source);
        let stamp_path = Self::stamp_path(&cache_path);
        let stamp = CacheStamp::of(source)?;

        if cache_path.exists() {
            let cached = fs::read(&stamp_path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<CacheStamp>(&bytes).ok());
            if cached.as_ref() == Some(&stamp) {
                debug!("Reusing decrypted copy {:?}", cache_path);
                return Ok(Unlocked {
                    path: cache_path,
                    reused: true,
                });
            }
        }

        info!("Decrypting {:?}", source);
        let data = fs::read(source).map_err(|e| Error::from_io_read(e, source.to_path_buf()))?;
        let plain = decrypt(&data, &self.key, &self.params)?;

        atomic_write(&cache_path, &plain)?;
        atomic_write(&stamp_path, &serde_json::to_vec_pretty(&stamp)?)?;
        info!("Decrypted {} pages to {:?}", plain.len() / self.params.page_size, cache_path);

        Ok(Unlocked {
            path: cache_path,
            reused: false,
        })
    }
}
