pub mod images;
pub mod package;
pub mod sanitize;
pub mod workspace;
pub mod xml;

/// Main document body.
pub const DOCUMENT_PART: &str = "word/document.xml";
/// Relationship table of the main document.
pub const RELATIONSHIPS_PART: &str = "word/_rels/document.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const MEDIA_DIR: &str = "word/media";
