//! Render context: one template in, one .docx out.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::docx::images::{ImageOptions, ImageTable};
use crate::docx::package;
use crate::docx::sanitize::{sanitize, SanitizeRules, SanitizeWarning};
use crate::docx::workspace::{destroy, Workspace};
use crate::docx::xml::check_well_formed;
use crate::docx::DOCUMENT_PART;
use crate::error::{DocxError, Result};
use crate::template::{
    escape_bare_ampersands, placeholders, PlaceholderMap, PlaceholderRenderer, TemplateRenderer,
};

/// When the sanitizer runs relative to placeholder substitution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeMode {
    #[default]
    Off,
    Before,
    After,
}

impl SanitizeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Some(Self::Off),
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub sanitize: SanitizeMode,
    pub rules: SanitizeRules,
    /// Rewrite bare `&` in the template as `&amp;` before substitution.
    pub escape_ampersands: bool,
    /// Warn when the rendered document is not well-formed XML.
    pub verify_markup: bool,
    pub images: ImageOptions,
    /// Parent directory for workspaces; system temp dir when unset.
    pub workspace_root: Option<PathBuf>,
    pub keep_workspace: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            sanitize: SanitizeMode::Off,
            rules: SanitizeRules::default(),
            escape_ampersands: true,
            verify_markup: true,
            images: ImageOptions::default(),
            workspace_root: None,
            keep_workspace: false,
        }
    }
}

/// Placeholders a template exposes.
#[derive(Clone, Debug, Default)]
pub struct TemplateReport {
    /// Names found after sanitizing, in order of first appearance.
    pub placeholders: Vec<String>,
    /// Names only visible once split runs are merged.
    pub split: Vec<String>,
    pub warnings: Vec<SanitizeWarning>,
}

pub struct Docx {
    options: RenderOptions,
    renderer: Box<dyn TemplateRenderer>,
    workspace: Option<Workspace>,
    content: Option<String>,
    images: ImageTable,
    warnings: Vec<SanitizeWarning>,
}

impl Default for Docx {
    fn default() -> Self {
        Self::new()
    }
}

impl Docx {
    pub fn new() -> Self {
        Self::with_options(RenderOptions::default())
    }

    pub fn with_options(options: RenderOptions) -> Self {
        Self {
            options,
            renderer: Box::new(PlaceholderRenderer::default()),
            workspace: None,
            content: None,
            images: ImageTable::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: impl TemplateRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Extracts `template`, substitutes `data` into its main document and
    /// registers `images` for [`Docx::save`].
    ///
    /// State from a previous render (workspace, images, warnings) is dropped.
    pub fn render(
        &mut self,
        template: impl AsRef<Path>,
        data: &PlaceholderMap,
        images: &[(String, PathBuf)],
    ) -> Result<&mut Self> {
        let template = template.as_ref();
        if !template.is_file() {
            return Err(DocxError::InputNotFound(template.to_path_buf()));
        }

        self.content = None;
        self.workspace = None;
        self.images = ImageTable::new();
        self.warnings.clear();

        let mut table = ImageTable::new();
        for (reference, path) in images {
            table.add(reference.clone(), path.clone())?;
        }

        let workspace = self.open_workspace(template)?;
        let source = read_document(&workspace)?;

        let mut xml = self.prepare_source(source);
        if self.options.sanitize == SanitizeMode::Before {
            xml = self.sanitize_pass(&xml);
        }
        xml = self.renderer.render(&xml, data)?;
        if self.options.sanitize == SanitizeMode::After {
            xml = self.sanitize_pass(&xml);
        }

        // Only a complete render leaves state behind for save().
        self.workspace = Some(workspace);
        self.content = Some(xml);
        self.images = table;

        log::info!(
            "rendered {} ({} variable(s), {} image(s))",
            template.display(),
            data.len(),
            self.images.len()
        );
        Ok(self)
    }

    /// Registers an image under `reference` for the next save.
    pub fn add_image(
        &mut self,
        reference: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<&mut Self> {
        self.images.add(reference, path)?;
        Ok(self)
    }

    /// Writes the rendered document and registered images back into the
    /// workspace and packs it as `output`.
    ///
    /// A failure part way may leave a partially written `output`.
    pub fn save(&mut self, output: impl AsRef<Path>) -> Result<()> {
        let output = output.as_ref();
        let (Some(workspace), Some(content)) = (self.workspace.as_ref(), self.content.as_ref())
        else {
            return Err(DocxError::NotRendered);
        };

        self.images.inject(workspace, &self.options.images)?;
        self.images = ImageTable::new();

        if self.options.verify_markup {
            if let Err(reason) = check_well_formed(content.as_bytes()) {
                log::warn!("rendered {DOCUMENT_PART} is not well-formed: {reason}");
            }
        }

        let doc_path = workspace.document_xml();
        std::fs::write(&doc_path, content).map_err(|e| DocxError::io(&doc_path, e))?;
        let entries = package::pack(workspace.path(), output)?;

        log::info!("saved {} ({entries} entries)", output.display());
        Ok(())
    }

    /// Lists the placeholders of `template` without rendering it.
    pub fn inspect(&self, template: impl AsRef<Path>) -> Result<TemplateReport> {
        let template = template.as_ref();
        if !template.is_file() {
            return Err(DocxError::InputNotFound(template.to_path_buf()));
        }
        let workspace = self.open_workspace(template)?;
        let source = self.prepare_source(read_document(&workspace)?);

        let raw = placeholders(&source);
        let report = sanitize(&source, &self.options.rules);
        let found = placeholders(&report.xml);
        let split = found.iter().filter(|n| !raw.contains(n)).cloned().collect();

        Ok(TemplateReport {
            placeholders: found,
            split,
            warnings: report.warnings,
        })
    }

    /// Rendered document XML, if a render succeeded.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Sanitizer warnings from the last render.
    pub fn warnings(&self) -> &[SanitizeWarning] {
        &self.warnings
    }

    pub fn images(&self) -> &ImageTable {
        &self.images
    }

    pub fn workspace_path(&self) -> Option<&Path> {
        self.workspace.as_ref().map(|w| w.path())
    }

    /// Removes the workspace now, even when it was configured to be kept.
    pub fn cleanup(&mut self) -> Result<()> {
        self.content = None;
        if let Some(mut workspace) = self.workspace.take() {
            let path = workspace.path().to_path_buf();
            workspace.keep();
            drop(workspace);
            destroy(&path)?;
        }
        Ok(())
    }

    fn open_workspace(&self, template: &Path) -> Result<Workspace> {
        let mut workspace = match &self.options.workspace_root {
            Some(root) => Workspace::create_in(root)?,
            None => Workspace::create()?,
        };
        if self.options.keep_workspace {
            workspace.keep();
        }
        package::extract(template, workspace.path())?;
        Ok(workspace)
    }

    fn prepare_source(&self, source: String) -> String {
        if self.options.escape_ampersands {
            escape_bare_ampersands(&source)
        } else {
            source
        }
    }

    fn sanitize_pass(&mut self, xml: &str) -> String {
        let report = sanitize(xml, &self.options.rules);
        log::debug!(
            "sanitized {DOCUMENT_PART}: {} tag(s), {} attribute(s), {} empty propert(ies), {} run join(s)",
            report.removed_tags,
            report.removed_attributes,
            report.collapsed_properties,
            report.merged_runs
        );
        for w in &report.warnings {
            log::warn!("{DOCUMENT_PART}: {w}");
        }
        self.warnings.extend(report.warnings);
        report.xml
    }
}

fn read_document(workspace: &Workspace) -> Result<String> {
    let path = workspace.document_xml();
    std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DocxError::MissingPart(DOCUMENT_PART.to_string()),
        _ => DocxError::io(&path, e),
    })
}

#[cfg(test)]
mod tests {
    use super::{Docx, RenderOptions, SanitizeMode};
    use crate::error::DocxError;
    use crate::template::PlaceholderMap;

    #[test]
    fn sanitize_mode_parse() {
        assert_eq!(SanitizeMode::parse("Before"), Some(SanitizeMode::Before));
        assert_eq!(SanitizeMode::parse(" after "), Some(SanitizeMode::After));
        assert_eq!(SanitizeMode::parse("none"), Some(SanitizeMode::Off));
        assert_eq!(SanitizeMode::parse("sometimes"), None);
    }

    #[test]
    fn ampersand_escaping_follows_options() {
        let src = "<w:t>R&D &amp; QA</w:t>".to_string();
        let docx = Docx::new();
        assert!(docx.options().escape_ampersands);
        assert_eq!(docx.prepare_source(src.clone()), "<w:t>R&amp;D &amp; QA</w:t>");

        let raw = Docx::with_options(RenderOptions {
            escape_ampersands: false,
            ..RenderOptions::default()
        });
        assert!(!raw.options().escape_ampersands);
        assert_eq!(raw.prepare_source(src.clone()), src);
    }

    #[test]
    fn save_before_render_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut docx = Docx::new();
        let err = docx.save(dir.path().join("out.docx")).expect_err("not rendered");
        assert!(matches!(err, DocxError::NotRendered));
    }

    #[test]
    fn missing_template_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let options = RenderOptions {
            workspace_root: Some(dir.path().join("ws")),
            ..RenderOptions::default()
        };
        let mut docx = Docx::with_options(options);
        let err = docx
            .render(dir.path().join("missing.docx"), &PlaceholderMap::new(), &[])
            .err()
            .expect("missing template");
        assert!(matches!(err, DocxError::InputNotFound(_)));
        assert!(docx.workspace_path().is_none());
        assert!(!dir.path().join("ws").exists());
    }
}
