use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::docx::sanitize::find_tag;
use crate::docx::workspace::Workspace;
use crate::docx::xml::{content_type_extensions, escape_attr, relationships};
use crate::docx::{CONTENT_TYPES_PART, RELATIONSHIPS_PART};
use crate::error::{DocxError, Result};

pub const IMAGE_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ImageOptions {
    /// Prepended to the reference key to form the relationship Id.
    #[serde(default = "default_id_prefix")]
    pub relationship_id_prefix: String,

    /// Declare a content type for image extensions the package lacks.
    #[serde(default = "default_true")]
    pub register_content_types: bool,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            relationship_id_prefix: default_id_prefix(),
            register_content_types: true,
        }
    }
}

fn default_id_prefix() -> String {
    "docxgen_".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageEntry {
    pub reference: String,
    pub path: PathBuf,
}

/// Images registered for one render, in registration order.
#[derive(Clone, Debug, Default)]
pub struct ImageTable {
    entries: Vec<ImageEntry>,
}

impl ImageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` under `reference`. On error the table is unchanged.
    pub fn add(&mut self, reference: impl Into<String>, path: impl Into<PathBuf>) -> Result<()> {
        let reference = reference.into();
        let path = path.into();
        if self.get(&reference).is_some() {
            return Err(DocxError::DuplicateReference(reference));
        }
        if !path.is_file() {
            return Err(DocxError::MissingImageFile(path));
        }
        log::debug!("image {reference} -> {}", path.display());
        self.entries.push(ImageEntry { reference, path });
        Ok(())
    }

    pub fn get(&self, reference: &str) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.reference == reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageEntry> {
        self.entries.iter()
    }

    /// Copies every image into `word/media/` and links it from the document
    /// relationships. Returns the number of images written.
    pub fn inject(&self, workspace: &Workspace, options: &ImageOptions) -> Result<usize> {
        if self.entries.is_empty() {
            return Ok(0);
        }

        let media = workspace.media_dir();
        std::fs::create_dir_all(&media).map_err(|e| DocxError::io(&media, e))?;

        let rels_path = workspace.relationships_xml();
        let mut rels = read_or_create_relationships(&rels_path)?;
        let existing: Vec<String> = relationships(rels.as_bytes())
            .map_err(|e| malformed(RELATIONSHIPS_PART, e))?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let mut copied: HashMap<String, &Path> = HashMap::new();
        let mut extensions: Vec<String> = Vec::new();
        for entry in &self.entries {
            let file_name = entry
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| DocxError::MissingImageFile(entry.path.clone()))?;

            let id = format!("{}{}", options.relationship_id_prefix, entry.reference);
            if existing.contains(&id) {
                return Err(DocxError::DuplicateReference(entry.reference.clone()));
            }

            if let Some(prev) = copied.insert(file_name.clone(), entry.path.as_path()) {
                if prev != entry.path.as_path() {
                    log::warn!(
                        "media/{file_name}: {} overwrites {}",
                        entry.path.display(),
                        prev.display()
                    );
                }
            }
            let dest = media.join(&file_name);
            std::fs::copy(&entry.path, &dest).map_err(|e| match e.kind() {
                ErrorKind::NotFound => DocxError::MissingImageFile(entry.path.clone()),
                _ => DocxError::io(&dest, e),
            })?;

            let fragment = relationship_fragment(&id, &format!("media/{file_name}"));
            rels = insert_after_root_open(&rels, "<Relationships", &fragment)
                .map_err(|reason| malformed(RELATIONSHIPS_PART, reason))?;

            if let Some(ext) = entry.path.extension() {
                let ext = ext.to_string_lossy().to_ascii_lowercase();
                if !extensions.contains(&ext) {
                    extensions.push(ext);
                }
            }
        }
        std::fs::write(&rels_path, rels).map_err(|e| DocxError::io(&rels_path, e))?;

        if options.register_content_types {
            register_content_types(workspace, &extensions)?;
        }

        log::info!("added {} image(s) to {}", self.entries.len(), RELATIONSHIPS_PART);
        Ok(self.entries.len())
    }
}

fn malformed(part: &str, reason: impl ToString) -> DocxError {
    DocxError::MalformedPart {
        part: part.to_string(),
        reason: reason.to_string(),
    }
}

fn read_or_create_relationships(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("{RELATIONSHIPS_PART} missing; starting an empty one");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| DocxError::io(parent, e))?;
            }
            Ok(format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n<Relationships xmlns=\"{RELATIONSHIPS_NS}\"></Relationships>"
            ))
        }
        Err(e) => Err(DocxError::io(path, e)),
    }
}

pub fn relationship_fragment(id: &str, target: &str) -> String {
    format!(
        r#"<Relationship Id="{}" Type="{IMAGE_RELATIONSHIP_TYPE}" Target="{}"/>"#,
        escape_attr(id),
        escape_attr(target)
    )
}

/// Inserts `fragment` right after the opening tag of the element starting
/// with `root` (`<Relationships`). A self-closing root is expanded.
pub fn insert_after_root_open(
    xml: &str,
    root: &str,
    fragment: &str,
) -> std::result::Result<String, String> {
    let start = find_tag(xml, root, 0).ok_or_else(|| format!("no {root}> element"))?;
    let end = xml[start..]
        .find('>')
        .map(|i| start + i)
        .ok_or_else(|| format!("{root} tag is not closed"))?;

    let mut out = String::with_capacity(xml.len() + fragment.len() + root.len() + 3);
    if xml[..end].ends_with('/') {
        out.push_str(xml[..end - 1].trim_end());
        out.push('>');
        out.push_str(fragment);
        out.push_str("</");
        out.push_str(&root[1..]);
        out.push('>');
    } else {
        out.push_str(&xml[..=end]);
        out.push_str(fragment);
    }
    out.push_str(&xml[end + 1..]);
    Ok(out)
}

fn content_type_for(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        "svg" => Some("image/svg+xml"),
        "emf" => Some("image/x-emf"),
        "wmf" => Some("image/x-wmf"),
        _ => None,
    }
}

/// Adds `<Default>` content types for `extensions` not yet declared.
fn register_content_types(workspace: &Workspace, extensions: &[String]) -> Result<usize> {
    let path = workspace.content_types_xml();
    let mut xml = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!("{CONTENT_TYPES_PART} missing; image content types not declared");
            return Ok(0);
        }
        Err(e) => return Err(DocxError::io(&path, e)),
    };
    let declared =
        content_type_extensions(xml.as_bytes()).map_err(|e| malformed(CONTENT_TYPES_PART, e))?;

    let mut added = 0usize;
    for ext in extensions {
        if declared.contains(ext) {
            continue;
        }
        let Some(content_type) = content_type_for(ext) else {
            log::warn!("no known content type for .{ext}; left undeclared");
            continue;
        };
        let fragment = format!(
            r#"<Default Extension="{}" ContentType="{content_type}"/>"#,
            escape_attr(ext)
        );
        xml = insert_after_root_open(&xml, "<Types", &fragment)
            .map_err(|reason| malformed(CONTENT_TYPES_PART, reason))?;
        added += 1;
    }
    if added > 0 {
        std::fs::write(&path, xml).map_err(|e| DocxError::io(&path, e))?;
    }
    Ok(added)
}
