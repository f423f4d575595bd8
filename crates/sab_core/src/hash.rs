//! String hashes and the registry resolving them back to names.
//!
//! Every identifier stored in the game data is a 32 bit, case-insensitive FNV style hash of
//! a name. The names themselves are not shipped with the game, so a dictionary of known
//! strings is loaded up front and extended with names found inline in the data.

use std::{fmt, path::Path, sync::Arc};

use derive_more::derive::From;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use tracing::{error, info, warn};

use crate::error::{Error, Result};

const FNV_OFFSET: u32 = 0x811C9DC5;
const FNV_PRIME: u32 = 0x1000193;

/// Hashes a string the way the game does.
///
/// Every byte is lowered by setting bit `0x20` before mixing, which makes the hash case
/// insensitive for ASCII letters. The empty string hashes to `0`.
pub const fn hash_string(value: &str) -> u32 {
    let bytes = value.as_bytes();
    if bytes.is_empty() {
        return 0;
    }

    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash = (hash ^ (bytes[i] | 0x20) as u32).wrapping_mul(FNV_PRIME);
        i += 1;
    }

    FNV_PRIME.wrapping_mul(hash ^ 0x2a)
}

const _: () = assert!(hash_string("ANY") == 3976557093);

/// An identifier read from the game data
///
/// Resolves to the interned name when the registry knows it, otherwise keeps the raw value.
/// Both variants print and serialize the same way, names verbatim and raw values as
/// uppercase hexadecimal.
#[derive(From, Debug, Clone, PartialEq, Eq, Hash)]
pub enum StringHash {
    /// Interned name
    Name(Arc<str>),
    /// Raw hash without a known name
    Hash(u32),
}

impl StringHash {
    /// The hash value of this identifier
    pub fn id(&self) -> u32 {
        match self {
            StringHash::Name(name) => hash_string(name),
            StringHash::Hash(id) => *id,
        }
    }

    /// The interned name, if known
    pub fn name(&self) -> Option<&str> {
        match self {
            StringHash::Name(name) => Some(name),
            StringHash::Hash(_) => None,
        }
    }
}

impl fmt::Display for StringHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StringHash::Name(name) => f.write_str(name),
            StringHash::Hash(id) => write!(f, "{id:X}"),
        }
    }
}

impl Serialize for StringHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Lookup statistics of a [`HashRegistry`]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of lookups
    pub calls: usize,
    /// Number of lookups that resolved to a name
    pub hits: usize,
}

#[derive(Debug, Default)]
struct Storage {
    names: IndexMap<u32, Arc<str>>,
    discovered: Vec<Arc<str>>,
    stats: RegistryStats,
}

/// Hash to name dictionary shared by every decoder
///
/// All reads and writes go through a single lock, so one registry can be shared between
/// extractors running in the same process.
///
/// ```
/// use sab_core::hash::{hash_string, HashRegistry, StringHash};
///
/// let registry = HashRegistry::from_dictionary("characters/sean\r\nweapons/mp40\n");
/// assert_eq!(registry.lookup(hash_string("weapons/mp40")).to_string(), "weapons/mp40");
/// assert_eq!(registry.lookup(0x1234), StringHash::Hash(0x1234));
/// ```
#[derive(Debug, Default)]
pub struct HashRegistry {
    storage: Mutex<Storage>,
}

impl HashRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a dictionary file, one name per line.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let registry = Self::from_dictionary(&String::from_utf8_lossy(&data));
        info!("loaded {} names", registry.len());
        Ok(registry)
    }

    /// Builds a registry from the text of a dictionary.
    ///
    /// Lines may end with `\n`, `\r\n` or `\r`. Blank lines are skipped. When two different
    /// names share a hash the collision is logged and the first one is kept.
    pub fn from_dictionary(text: &str) -> Self {
        let mut storage = Storage::default();

        for line in text.split(['\r', '\n']).filter(|l| !l.is_empty()) {
            let id = hash_string(line);
            match storage.names.get(&id) {
                Some(existing) if existing.eq_ignore_ascii_case(line) => {}
                Some(existing) => error!("string collision: {} vs: {}", existing, line),
                None => {
                    storage.names.insert(id, line.into());
                }
            }
        }

        Self {
            storage: Mutex::new(storage),
        }
    }

    /// Number of known names
    pub fn len(&self) -> usize {
        self.storage.lock().names.len()
    }

    /// Whether no name is known
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves a hash, falling back to the raw value when no name is known.
    pub fn lookup(&self, id: u32) -> StringHash {
        let mut storage = self.storage.lock();
        storage.stats.calls += 1;

        match storage.names.get(&id).cloned() {
            Some(name) => {
                storage.stats.hits += 1;
                StringHash::Name(name)
            }
            None => StringHash::Hash(id),
        }
    }

    /// Binds a name found inline in the data to the hash stored next to it.
    ///
    /// A known hash must be bound to the same name, ignoring case. A new name must hash
    /// to `id`. An empty name binds nothing and resolves like [`HashRegistry::lookup`].
    pub fn bind(&self, id: u32, name: &str) -> Result<StringHash> {
        if name.is_empty() {
            return Ok(self.lookup(id));
        }

        let mut storage = self.storage.lock();
        if let Some(existing) = storage.names.get(&id) {
            if !existing.eq_ignore_ascii_case(name) {
                return Err(Error::HashCollision {
                    id,
                    existing: existing.to_string(),
                    name: name.to_owned(),
                });
            }
            return Ok(StringHash::Name(existing.clone()));
        }

        if hash_string(name) != id {
            return Err(Error::HashMismatch {
                id,
                name: name.to_owned(),
            });
        }

        let name: Arc<str> = name.into();
        storage.names.insert(id, name.clone());
        storage.discovered.push(name.clone());
        Ok(StringHash::Name(name))
    }

    /// Hashes `name` and binds it.
    pub fn bind_name(&self, name: &str) -> Result<StringHash> {
        self.bind(hash_string(name), name)
    }

    /// Names learned from the data since the dictionary was loaded
    pub fn discovered(&self) -> Vec<Arc<str>> {
        self.storage.lock().discovered.clone()
    }

    /// Lookup statistics
    pub fn stats(&self) -> RegistryStats {
        self.storage.lock().stats
    }

    /// Logs the names missing from the dictionary and the lookup statistics.
    pub fn report(&self) {
        let storage = self.storage.lock();
        for name in &storage.discovered {
            warn!("unused hash: {}", name);
        }

        info!(
            "string calls: {}, string hits: {}",
            storage.stats.calls, storage.stats.hits
        );
    }
}
