use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::KeepaliveError;

/// Width of a region in block columns
pub const REGION_SIZE: i32 = 16;

/// Namespace used when a world id is written without one
pub const DEFAULT_WORLD_NAMESPACE: &str = "world";

// Packed loader position layout: x | z | y, high to low
const LOADER_X_BITS: u32 = 26;
const LOADER_Z_BITS: u32 = 26;
const LOADER_Y_BITS: u32 = 12;
const LOADER_Y_SHIFT: u32 = 0;
const LOADER_Z_SHIFT: u32 = LOADER_Y_SHIFT + LOADER_Y_BITS;
const LOADER_X_SHIFT: u32 = LOADER_Z_SHIFT + LOADER_Z_BITS;
const LOADER_X_MASK: i64 = (1 << LOADER_X_BITS) - 1;
const LOADER_Z_MASK: i64 = (1 << LOADER_Z_BITS) - 1;
const LOADER_Y_MASK: i64 = (1 << LOADER_Y_BITS) - 1;

/// Position of a region in the world grid (region coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionCoord {
    pub x: i32,
    pub z: i32,
}

impl RegionCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region containing the given block column
    pub fn from_block(block_x: i32, block_z: i32) -> Self {
        Self::new(block_x.div_euclid(REGION_SIZE), block_z.div_euclid(REGION_SIZE))
    }

    /// Region the loader device itself stands in
    pub fn containing(loader: LoaderPos) -> Self {
        Self::from_block(loader.x, loader.z)
    }

    /// Pack into a single integer, x in the low half and z in the high half
    pub fn to_long(self) -> i64 {
        let low = self.x as u32 as u64;
        let high = (self.z as u32 as u64) << 32;
        (high | low) as i64
    }

    /// Inverse of [`RegionCoord::to_long`]
    pub fn from_long(packed: i64) -> Self {
        Self::new(packed as i32, (packed >> 32) as i32)
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Block position of a loader device inside its world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoaderPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl LoaderPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Whether the position survives a trip through [`LoaderPos::to_long`]
    pub fn is_packable(&self) -> bool {
        fits(self.x, LOADER_X_BITS) && fits(self.y, LOADER_Y_BITS) && fits(self.z, LOADER_Z_BITS)
    }

    /// Pack into a single integer. Positions outside the packable range are truncated.
    pub fn to_long(self) -> i64 {
        ((self.x as i64 & LOADER_X_MASK) << LOADER_X_SHIFT)
            | ((self.z as i64 & LOADER_Z_MASK) << LOADER_Z_SHIFT)
            | ((self.y as i64 & LOADER_Y_MASK) << LOADER_Y_SHIFT)
    }

    /// Inverse of [`LoaderPos::to_long`], sign extending every field
    pub fn from_long(packed: i64) -> Self {
        let x = packed >> LOADER_X_SHIFT;
        let z = (packed << (64 - LOADER_Z_SHIFT - LOADER_Z_BITS)) >> (64 - LOADER_Z_BITS);
        let y = (packed << (64 - LOADER_Y_SHIFT - LOADER_Y_BITS)) >> (64 - LOADER_Y_BITS);
        Self::new(x as i32, y as i32, z as i32)
    }
}

impl fmt::Display for LoaderPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

fn fits(value: i32, bits: u32) -> bool {
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    (min..=max).contains(&(value as i64))
}

/// Namespaced identifier of a world or dimension, `namespace:path`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorldId {
    text: String,
    split: usize,
}

impl WorldId {
    /// Parse `namespace:path`, or a bare path in the default namespace
    pub fn parse(text: &str) -> Result<Self, KeepaliveError> {
        let (namespace, path) = match text.split_once(':') {
            Some((namespace, path)) => (namespace, path),
            None => (DEFAULT_WORLD_NAMESPACE, text),
        };

        if namespace.is_empty() {
            return Err(invalid(text, "namespace is empty"));
        }
        if path.is_empty() {
            return Err(invalid(text, "path is empty"));
        }
        if !namespace.chars().all(is_namespace_char) {
            return Err(invalid(text, "namespace may only contain [a-z0-9_.-]"));
        }
        if !path.chars().all(|c| is_namespace_char(c) || c == '/') {
            return Err(invalid(text, "path may only contain [a-z0-9_.-/]"));
        }
        // Ids double as storage directories
        if matches!(namespace, "." | "..")
            || path.split('/').any(|segment| matches!(segment, "" | "." | ".."))
        {
            return Err(invalid(text, "empty, '.' or '..' segment"));
        }

        Ok(Self {
            text: format!("{}:{}", namespace, path),
            split: namespace.len(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.text[..self.split]
    }

    pub fn path(&self) -> &str {
        &self.text[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

fn is_namespace_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-')
}

fn invalid(text: &str, reason: &str) -> KeepaliveError {
    KeepaliveError::InvalidWorldId {
        value: text.to_string(),
        reason: reason.to_string(),
    }
}

impl FromStr for WorldId {
    type Err = KeepaliveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WorldId {
    type Error = KeepaliveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WorldId> for String {
    fn from(id: WorldId) -> Self {
        id.text
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
