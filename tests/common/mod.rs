#![allow(dead_code)]

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use pdf_batcher::{CompressError, Compressor};

/// Write a PDF with one page per label plus `padding` bytes in an
/// unreferenced stream, so tests can control file sizes.
///
/// Integration tests cannot reach the crate's `#[cfg(test)]` fixtures, so this
/// builder stands on its own. It also differs on purpose: `MediaBox` and
/// `Resources` sit on each page here, while the unit-test fixture puts them on
/// the page tree root to exercise inheritance.
pub fn write_pdf(path: &Path, labels: &[&str], padding: usize) -> PathBuf {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).unwrap();
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for label in labels {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*label)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(page_id.into());
    }

    if padding > 0 {
        doc.add_object(Stream::new(dictionary! {}, vec![b'x'; padding]));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
    path.to_path_buf()
}

pub fn write_garbage(path: &Path, size: usize) -> PathBuf {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).unwrap();
    }
    fs::write(path, vec![b'#'; size]).unwrap();
    path.to_path_buf()
}

pub fn page_count(path: &Path) -> usize {
    Document::load(path).unwrap().get_pages().len()
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Replaces every input with a fresh one-page PDF.
pub struct Shrinking;

impl Compressor for Shrinking {
    fn compress(&self, _input: &Path, output: &Path) -> Result<PathBuf, CompressError> {
        Ok(write_pdf(output, &["compressed"], 0))
    }

    fn name(&self) -> &str {
        "shrinking"
    }
}

/// Copies the input unchanged.
pub struct Copying;

impl Compressor for Copying {
    fn compress(&self, input: &Path, output: &Path) -> Result<PathBuf, CompressError> {
        fs::copy(input, output)?;
        Ok(output.to_path_buf())
    }

    fn name(&self) -> &str {
        "copy"
    }
}

/// Always fails, like a missing Ghostscript install.
pub struct Failing;

impl Compressor for Failing {
    fn compress(&self, _input: &Path, _output: &Path) -> Result<PathBuf, CompressError> {
        Err(CompressError::ToolFailed {
            status: "exit status: 1".to_string(),
            stderr: "Unrecoverable error".to_string(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Writes a one-page PDF like `Shrinking`, but its first call also plants a
/// directory at `blocker` so writing a file there fails. With `clear_after_first`
/// set, the second call removes it again.
pub struct Obstructing {
    blocker: PathBuf,
    clear_after_first: bool,
    calls: Cell<usize>,
}

impl Obstructing {
    pub fn new(blocker: PathBuf, clear_after_first: bool) -> Self {
        Self {
            blocker,
            clear_after_first,
            calls: Cell::new(0),
        }
    }
}

impl Compressor for Obstructing {
    fn compress(&self, _input: &Path, output: &Path) -> Result<PathBuf, CompressError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if call == 0 {
            fs::create_dir_all(&self.blocker)?;
        } else if call == 1 && self.clear_after_first {
            fs::remove_dir_all(&self.blocker)?;
        }
        Ok(write_pdf(output, &["compressed"], 0))
    }

    fn name(&self) -> &str {
        "obstructing"
    }
}
