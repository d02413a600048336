//! Fill placeholders in Word (.docx) templates and attach images.
//!
//! ```no_run
//! use docxgen::{Docx, PlaceholderMap};
//!
//! let mut data = PlaceholderMap::new();
//! data.insert("name".to_string(), "World".to_string());
//!
//! let mut docx = Docx::new();
//! docx.render("letter.docx", &data, &[])?;
//! docx.save("letter-out.docx")?;
//! # Ok::<(), docxgen::DocxError>(())
//! ```

pub mod config;
pub mod docx;
pub mod error;
pub mod generator;
pub mod template;

pub use error::{DocxError, Result};
pub use generator::{Docx, RenderOptions, SanitizeMode, TemplateReport};
pub use template::{PlaceholderMap, PlaceholderRenderer, TemplateRenderer};
