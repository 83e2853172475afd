//! Shared types read from per-folder manifests.
//!
//! A gallery folder publishes a single JSON manifest next to its `index.html`:
//!
//! ```json
//! {
//!   "images": {
//!     "dawn.jpg": { "src": "https://example.org/Landscapes/dawn.jpg",
//!                   "msrc": "https://example.org/Landscapes/.thumbnails/dawn.jpg",
//!                   "name": "dawn.jpg", "tags": ["nature|sky"] }
//!   },
//!   "subfolders": [
//!     { "url": "https://example.org/Landscapes/Alps/",
//!       "name": "Alps",
//!       "metadata": "https://example.org/Landscapes/Alps/.metadata.json" }
//!   ]
//! }
//! ```
//!
//! These types are read-only: they are fetched, parsed once, and never mutated.

use serde::{Deserialize, Serialize};

/// One image record from a manifest.
///
/// `src` is the identity key: two records with the same `src` are the same
/// image, whichever folder declared them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageItem {
    /// Full-resolution image URL.
    pub src: String,
    /// Thumbnail URL.
    pub msrc: String,
    /// File name, the last path segment of `src`.
    pub name: String,
    /// Hierarchical tags, delimiter-joined (`"animals|birds"`).
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
    /// Optional TIFF original.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiff: Option<String>,
    /// Optional camera RAW original.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// A child folder reference. Identity key is `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderDescriptor {
    /// Folder page URL.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// URL of the folder's own manifest. Folders without one cannot be
    /// aggregated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

/// A parsed folder manifest.
///
/// `images` keeps the declaration order of the JSON object; the names
/// (object keys) are dropped since every item carries its own `name`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub images: Vec<ImageItem>,
    pub subfolders: Vec<FolderDescriptor>,
}

/// Wire shape of a manifest. Missing or `null` sections mean empty.
#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    images: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    subfolders: Option<Vec<FolderDescriptor>>,
}

impl Manifest {
    /// Parse a manifest body.
    ///
    /// Fails if the body is not JSON, or if any image record or folder
    /// descriptor does not have the expected shape.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        let raw: RawManifest = serde_json::from_str(body)?;
        let images = raw
            .images
            .unwrap_or_default()
            .into_iter()
            .map(|(_, value)| serde_json::from_value(value))
            .collect::<Result<Vec<ImageItem>, _>>()?;
        Ok(Self {
            images,
            subfolders: raw.subfolders.unwrap_or_default(),
        })
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
