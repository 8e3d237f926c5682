//! Image records
//!
//! Only the catalogue entry is tracked; image files live elsewhere.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// Microkernel
    Mk,
    Os,
    Xenserver,
}

impl ImageKind {
    pub const ALL: [Self; 3] = [Self::Mk, Self::Os, Self::Xenserver];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mk => "mk",
            Self::Os => "os",
            Self::Xenserver => "xenserver",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ModelError::InputError(format!("Invalid image type '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub uuid: String,

    #[serde(default)]
    pub version: u64,

    pub kind: ImageKind,

    pub name: String,

    /// Release string of the image contents, e.g. `0.12.0`
    pub image_version: String,

    /// Kernel path relative to the image root
    pub kernel: String,

    pub initrd: String,

    #[serde(default)]
    pub description: String,
}

impl ImageRecord {
    pub fn new(
        kind: ImageKind,
        name: impl Into<String>,
        image_version: impl Into<String>,
        kernel: impl Into<String>,
        initrd: impl Into<String>,
    ) -> Self {
        Self {
            uuid: crate::new_uuid(),
            version: 0,
            kind,
            name: name.into(),
            image_version: image_version.into(),
            kernel: kernel.into(),
            initrd: initrd.into(),
            description: String::new(),
        }
    }

    /// Numeric components of `image_version`; non-numeric parts count as 0
    pub fn version_key(&self) -> Vec<u64> {
        self.image_version
            .split(['.', '-', '_'])
            .map(|part| part.parse().unwrap_or(0))
            .collect()
    }

    pub fn cmp_version(&self, other: &Self) -> Ordering {
        self.version_key().cmp(&other.version_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering_is_numeric() {
        let old = ImageRecord::new(ImageKind::Mk, "mk", "0.9.3", "k", "i");
        let new = ImageRecord::new(ImageKind::Mk, "mk", "0.10.0", "k", "i");
        assert_eq!(old.cmp_version(&new), Ordering::Less);
    }
}
