//! Notification-message (manifest) XML codec.
//!
//! ```xml
//! <dataProductMessage>
//!   <messageType>SDNM</messageType>
//!   <identifier>kplr2009123456_sdnm.xml</identifier>
//!   <fileList>
//!     <file>
//!       <filename>kplr2009123456_lcs-targ.fits</filename>
//!       <checksum>3f2a…</checksum>
//!       <size>2880</size>
//!     </file>
//!   </fileList>
//! </dataProductMessage>
//! ```
//!
//! Parsing and validation are separate steps: [`ManifestDocument::load`] accepts
//! any document with the right shape, [`ManifestDocument::validate`] enforces the
//! schema and yields a [`Manifest`]. The handler stages files between the two.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ManifestError};
use crate::filename::is_bare_file_name;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

// ---------------------------------------------------------------------------
// Validated model
// ---------------------------------------------------------------------------

/// One data file announced by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub checksum: String,
    pub size: u64,
}

/// A schema-valid notification message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub message_type: String,
    pub identifier: String,
    pub files: Vec<FileEntry>,
}

impl Manifest {
    /// Parse and validate in one step; used by the operator tools.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        ManifestDocument::load(path)?.validate(path)
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.filename.as_str())
    }

    /// Render as an indented XML document with declaration.
    pub fn to_xml(&self) -> Result<String, ManifestError> {
        ManifestDocument::from(self).to_xml()
    }

    /// Atomically write the manifest to `path` (`<path>.tmp` then rename).
    ///
    /// The temporary name does not end in a message suffix, so a watcher never
    /// picks up a half-written manifest.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let xml = self.to_xml()?;
        let tmp = path.with_file_name(format!(
            "{}.tmp",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));
        std::fs::write(&tmp, xml).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(path, e));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire document
// ---------------------------------------------------------------------------

/// The manifest as it appears on the wire, before schema validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "dataProductMessage")]
pub struct ManifestDocument {
    #[serde(
        rename = "messageType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub message_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(rename = "fileList", default)]
    pub file_list: FileListXml,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListXml {
    #[serde(rename = "file", default)]
    pub files: Vec<FileXml>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileXml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl ManifestDocument {
    /// Read and parse `path` without schema validation.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        Self::parse(&contents).map_err(|message| ManifestError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(xml: &str) -> Result<Self, String> {
        quick_xml::de::from_str(xml).map_err(|e| e.to_string())
    }

    /// Every filename present in the document, valid or not.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.file_list
            .files
            .iter()
            .filter_map(|f| f.filename.as_deref())
    }

    pub fn file_count(&self) -> usize {
        self.file_list.files.len()
    }

    /// Check the schema and convert into a [`Manifest`].
    ///
    /// Every violation is collected; the error lists all of them.
    pub fn validate(self, path: &Path) -> Result<Manifest, ManifestError> {
        let mut reasons = Vec::new();

        let message_type = non_empty(self.message_type);
        if message_type.is_none() {
            reasons.push("missing messageType".to_string());
        }
        let identifier = non_empty(self.identifier);
        if identifier.is_none() {
            reasons.push("missing identifier".to_string());
        }

        let mut seen = HashSet::new();
        let mut files = Vec::with_capacity(self.file_list.files.len());
        for (idx, file) in self.file_list.files.into_iter().enumerate() {
            let Some(filename) = non_empty(file.filename) else {
                reasons.push(format!("file #{idx}: missing filename"));
                continue;
            };
            if !is_bare_file_name(&filename) {
                reasons.push(format!("file #{idx}: '{filename}' is not a bare file name"));
            }
            if !seen.insert(filename.clone()) {
                reasons.push(format!("file #{idx}: duplicate filename '{filename}'"));
            }
            let checksum = non_empty(file.checksum);
            if checksum.is_none() {
                reasons.push(format!("file #{idx} ({filename}): missing checksum"));
            }
            let size = match non_empty(file.size).map(|s| s.parse::<u64>()) {
                Some(Ok(size)) => Some(size),
                Some(Err(_)) => {
                    reasons.push(format!("file #{idx} ({filename}): size is not a number"));
                    None
                }
                None => {
                    reasons.push(format!("file #{idx} ({filename}): missing size"));
                    None
                }
            };
            if let (Some(checksum), Some(size)) = (checksum, size) {
                files.push(FileEntry {
                    filename,
                    checksum,
                    size,
                });
            }
        }

        match (message_type, identifier) {
            (Some(message_type), Some(identifier)) if reasons.is_empty() => Ok(Manifest {
                message_type,
                identifier,
                files,
            }),
            _ => Err(ManifestError::Invalid {
                path: path.to_path_buf(),
                reasons,
            }),
        }
    }

    pub fn to_xml(&self) -> Result<String, ManifestError> {
        let mut body = String::new();
        let mut ser = quick_xml::se::Serializer::new(&mut body);
        ser.indent(' ', 2);
        self.serialize(ser)
            .map_err(|e| ManifestError::Serialize(e.to_string()))?;
        Ok(format!("{XML_DECLARATION}\n{body}\n"))
    }
}

impl From<&Manifest> for ManifestDocument {
    fn from(manifest: &Manifest) -> Self {
        Self {
            message_type: Some(manifest.message_type.clone()),
            identifier: Some(manifest.identifier.clone()),
            file_list: FileListXml {
                files: manifest
                    .files
                    .iter()
                    .map(|f| FileXml {
                        filename: Some(f.filename.clone()),
                        checksum: Some(f.checksum.clone()),
                        size: Some(f.size.to_string()),
                    })
                    .collect(),
            },
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
