use std::io::Write;
use std::path::{Path, PathBuf};

use docxgen::docx::package::{entry_names, read_entry};
use docxgen::{Docx, DocxError, PlaceholderMap, RenderOptions, SanitizeMode};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

fn document(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p>{body}</w:p></w:body></w:document>"#
    )
}

fn write_template(path: &Path, document_xml: &str) {
    let f = std::fs::File::create(path).expect("create template");
    let mut z = ZipWriter::new(f);
    let entries: [(&str, &[u8]); 4] = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("word/document.xml", document_xml.as_bytes()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS.as_bytes()),
        ("word/styles.xml", b"<w:styles/>"),
    ];
    for (name, data) in entries {
        z.start_file(name, SimpleFileOptions::default())
            .expect("start file");
        z.write_all(data).expect("write entry");
    }
    z.finish().expect("finish zip");
}

fn options_in(dir: &Path, sanitize: SanitizeMode) -> RenderOptions {
    RenderOptions {
        sanitize,
        workspace_root: Some(dir.join("workspaces")),
        ..RenderOptions::default()
    }
}

fn data(pairs: &[(&str, &str)]) -> PlaceholderMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn read_text(archive: &Path, name: &str) -> String {
    String::from_utf8(read_entry(archive, name).expect("read entry")).expect("utf8")
}

fn workspace_count(dir: &Path) -> usize {
    match std::fs::read_dir(dir.join("workspaces")) {
        Ok(rd) => rd.count(),
        Err(_) => 0,
    }
}

#[test]
fn split_placeholder_renders_after_sanitizing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("hello.docx");
    write_template(
        &template,
        &document(
            r#"<w:r><w:rsidR="00AB"><w:t>Hello </w:t></w:r><w:r><w:rsidR="00AB"><w:t>{{name}}</w:t></w:r>"#,
        ),
    );
    let output = dir.path().join("out.docx");

    let mut docx = Docx::with_options(options_in(dir.path(), SanitizeMode::Before));
    docx.render(&template, &data(&[("name", "World")]), &[])
        .expect("render");
    docx.save(&output).expect("save");

    let xml = read_text(&output, "word/document.xml");
    assert!(xml.contains("<w:r><w:t>Hello World</w:t></w:r>"), "{xml}");
    assert!(!xml.contains("rsidR"));
    assert!(docx.warnings().is_empty());
}

#[test]
fn untouched_template_round_trips_byte_for_byte() {
    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("plain.docx");
    let doc = document(
        r#"<w:r w:rsidR="00AB"><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Q&amp;A </w:t></w:r><w:proofErr w:type="spellStart"/>"#,
    );
    write_template(&template, &doc);
    let output = dir.path().join("out.docx");

    let mut docx = Docx::with_options(options_in(dir.path(), SanitizeMode::Off));
    docx.render(&template, &PlaceholderMap::new(), &[])
        .expect("render");
    docx.save(&output).expect("save");

    assert_eq!(read_text(&output, "word/document.xml"), doc);
    assert_eq!(
        read_text(&output, "word/_rels/document.xml.rels"),
        DOCUMENT_RELS
    );
    assert_eq!(read_text(&output, "[Content_Types].xml"), CONTENT_TYPES);
    let names = entry_names(&output).expect("names");
    assert_eq!(names.first().map(String::as_str), Some("[Content_Types].xml"));
    assert_eq!(names.len(), 4);
}

#[test]
fn image_is_copied_and_linked() {
    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("img.docx");
    write_template(&template, &document("<w:r><w:t>{{title}}</w:t></w:r>"));
    let logo = dir.path().join("logo.png");
    std::fs::write(&logo, b"\x89PNG\r\n\x1a\nfake").expect("write png");
    let output = dir.path().join("out.docx");

    let images: Vec<(String, PathBuf)> = vec![("logo".to_string(), logo)];
    let mut docx = Docx::with_options(options_in(dir.path(), SanitizeMode::Off));
    docx.render(&template, &data(&[("title", "Report")]), &images)
        .expect("render");
    assert_eq!(docx.images().len(), 1);
    docx.save(&output).expect("save");

    let names = entry_names(&output).expect("names");
    assert!(names.iter().any(|n| n == "word/media/logo.png"), "{names:?}");
    assert_eq!(
        read_entry(&output, "word/media/logo.png").expect("media"),
        b"\x89PNG\r\n\x1a\nfake"
    );
    let rels = read_text(&output, "word/_rels/document.xml.rels");
    assert!(rels.contains(r#"Id="docxgen_logo""#), "{rels}");
    assert!(rels.contains(r#"Target="media/logo.png""#));
    assert!(rels.contains(r#"Id="rId1""#));
    let types = read_text(&output, "[Content_Types].xml");
    assert!(types.contains(r#"Extension="png""#));
    assert!(read_text(&output, "word/document.xml").contains("<w:t>Report</w:t>"));
}

#[test]
fn duplicate_image_reference_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("img.docx");
    write_template(&template, &document("<w:r><w:t>x</w:t></w:r>"));
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    std::fs::write(&a, b"a").expect("write");
    std::fs::write(&b, b"b").expect("write");

    let mut docx = Docx::with_options(options_in(dir.path(), SanitizeMode::Off));
    docx.render(&template, &PlaceholderMap::new(), &[("logo".to_string(), a.clone())])
        .expect("render");
    let err = docx.add_image("logo", b).err().expect("duplicate");
    assert!(matches!(err, DocxError::DuplicateReference(ref r) if r == "logo"));
    assert_eq!(docx.images().get("logo").map(|e| e.path.clone()), Some(a));

    let err = docx
        .add_image("chart", dir.path().join("missing.png"))
        .err()
        .expect("missing image");
    assert!(matches!(err, DocxError::MissingImageFile(_)));
    assert_eq!(docx.images().len(), 1);
}

#[test]
fn corrupt_archive_fails_and_leaves_no_workspace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("bad.docx");
    std::fs::write(&template, b"PK\x03\x04 this is not a zip").expect("write");

    let mut docx = Docx::with_options(options_in(dir.path(), SanitizeMode::Off));
    let err = docx
        .render(&template, &PlaceholderMap::new(), &[])
        .err()
        .expect("corrupt archive");
    assert!(matches!(err, DocxError::ArchiveOpen { .. }), "{err}");
    assert!(docx.content().is_none());
    assert_eq!(workspace_count(dir.path()), 0);
}

#[test]
fn workspace_is_removed_on_drop_unless_kept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("t.docx");
    write_template(&template, &document("<w:r><w:t>{{a}}</w:t></w:r>"));

    {
        let mut docx = Docx::with_options(options_in(dir.path(), SanitizeMode::Off));
        docx.render(&template, &data(&[("a", "1")]), &[])
            .expect("render");
        let ws = docx.workspace_path().expect("workspace").to_path_buf();
        assert!(ws.join("word").join("document.xml").is_file());
    }
    assert_eq!(workspace_count(dir.path()), 0);

    let mut options = options_in(dir.path(), SanitizeMode::Off);
    options.keep_workspace = true;
    let kept = {
        let mut docx = Docx::with_options(options);
        docx.render(&template, &data(&[("a", "1")]), &[])
            .expect("render");
        docx.workspace_path().expect("workspace").to_path_buf()
    };
    assert!(kept.is_dir());

    let mut docx = Docx::with_options(options_in(dir.path(), SanitizeMode::Off));
    docx.render(&template, &data(&[("a", "1")]), &[])
        .expect("render");
    let ws = docx.workspace_path().expect("workspace").to_path_buf();
    docx.cleanup().expect("cleanup");
    assert!(!ws.exists());
    let err = docx.save(dir.path().join("o.docx")).expect_err("cleaned up");
    assert!(matches!(err, DocxError::NotRendered));
}

#[test]
fn inspect_reports_split_placeholders() {
    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("t.docx");
    write_template(
        &template,
        &document(
            r#"<w:r><w:t>{{first}} {{na</w:t></w:r><w:r><w:t>me}}</w:t></w:r>"#,
        ),
    );

    let docx = Docx::with_options(options_in(dir.path(), SanitizeMode::Off));
    let report = docx.inspect(&template).expect("inspect");
    assert_eq!(report.placeholders, vec!["first", "name"]);
    assert_eq!(report.split, vec!["name"]);
    assert_eq!(workspace_count(dir.path()), 0);
}

#[test]
fn failed_render_leaves_nothing_to_save() {
    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("t.docx");
    write_template(&template, &document("<w:r><w:t>{{a}}</w:t></w:r>"));
    let output = dir.path().join("out.docx");

    let mut docx = Docx::with_options(options_in(dir.path(), SanitizeMode::Off));
    docx.render(&template, &data(&[("a", "1")]), &[])
        .expect("first render");

    let images = vec![("logo".to_string(), dir.path().join("missing.png"))];
    let err = docx
        .render(&template, &data(&[("a", "2")]), &images)
        .err()
        .expect("missing image");
    assert!(matches!(err, DocxError::MissingImageFile(_)));
    assert!(docx.content().is_none());
    assert!(docx.workspace_path().is_none());
    assert!(docx.images().is_empty());

    let err = docx.save(&output).expect_err("nothing rendered");
    assert!(matches!(err, DocxError::NotRendered));
    assert!(!output.exists());
    assert_eq!(workspace_count(dir.path()), 0);
}
