//! Page concatenation.
//!
//! Inputs are loaded one by one, renumbered into a shared object space and
//! their pages hung under a fresh page tree. Inputs that fail to load are
//! skipped; the merge only fails to produce output when none of them loaded.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Object types that belong to an input's document structure rather than its
/// content. They are rebuilt for the merged output.
const STRUCTURAL: [&[u8]; 4] = [b"Catalog", b"Pages", b"Outlines", b"Outline"];

#[derive(Debug)]
pub struct SkippedInput {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Inputs whose pages made it into the output, in order
    pub included: Vec<PathBuf>,
    pub skipped: Vec<SkippedInput>,
    pub pages: usize,
    /// Whether an output file was written
    pub written: bool,
}

/// A loaded input, already renumbered, with its pages flattened.
struct Loaded {
    pages: Vec<(ObjectId, Dictionary)>,
    objects: BTreeMap<ObjectId, Object>,
}

/// Merge `inputs` into `output`, in order.
///
/// Unreadable inputs are skipped and reported in the outcome. If nothing could
/// be read no file is written. Errors are returned only for failures to write
/// the output.
pub fn merge_pdfs<P: AsRef<Path>>(inputs: &[P], output: &Path) -> Result<MergeOutcome> {
    let mut outcome = MergeOutcome::default();
    let mut next_id = 1;
    let mut loaded = Vec::new();

    for input in inputs {
        let input = input.as_ref();
        match load_input(input, next_id) {
            Ok((part, max_id)) => {
                next_id = max_id + 1;
                outcome.pages += part.pages.len();
                outcome.included.push(input.to_path_buf());
                loaded.push(part);
            }
            Err(e) => {
                log::warn!("Skipping {}: {:#}", input.display(), e);
                outcome.skipped.push(SkippedInput {
                    path: input.to_path_buf(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    if loaded.is_empty() {
        return Ok(outcome);
    }

    let mut doc = assemble(loaded);
    if let Some(dir) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    doc.save(output)
        .with_context(|| format!("Failed to save merged PDF: {}", output.display()))?;

    log::info!(
        "Merged {} files ({} pages) into {}",
        outcome.included.len(),
        outcome.pages,
        output.display()
    );
    outcome.written = true;
    Ok(outcome)
}

fn load_input(path: &Path, first_id: u32) -> Result<(Loaded, u32)> {
    let mut doc = Document::load(path).context("Failed to load PDF")?;
    if doc.is_encrypted() {
        doc.decrypt(b"")
            .map_err(|e| anyhow::anyhow!("encrypted and the empty password failed: {:?}", e))?;
    }

    doc.renumber_objects_with(first_id);

    let pages = doc
        .get_pages()
        .into_values()
        .map(|page_id| Ok((page_id, flatten_page(&doc, page_id)?)))
        .collect::<Result<Vec<_>>>()
        .context("Broken page tree")?;

    let max_id = doc.max_id.max(first_id);
    Ok((
        Loaded {
            pages,
            objects: doc.objects,
        },
        max_id,
    ))
}

/// Copy of the page dictionary with inherited attributes filled in.
fn flatten_page(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut page = doc.get_dictionary(page_id)?.clone();
    let mut parent = page.get(b"Parent").and_then(|o| o.as_reference()).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        depth += 1;
        if depth > 64 {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(|o| o.as_reference()).ok();
    }

    Ok(page)
}

fn type_of(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(|o| o.as_name()).ok()
}

fn assemble(parts: Vec<Loaded>) -> Document {
    let mut doc = Document::with_version("1.5");
    let mut pages = Vec::new();

    for part in parts {
        let page_ids: HashSet<ObjectId> = part.pages.iter().map(|(id, _)| *id).collect();
        for (id, object) in part.objects {
            let skip = page_ids.contains(&id)
                || type_of(&object).is_some_and(|t| STRUCTURAL.contains(&t));
            if !skip {
                doc.objects.insert(id, object);
            }
        }
        pages.extend(part.pages);
    }

    doc.max_id = doc
        .objects
        .keys()
        .chain(pages.iter().map(|(id, _)| id))
        .map(|id| id.0)
        .max()
        .unwrap_or(0);

    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    let count = kids.len() as i64;

    for (id, mut page) in pages {
        page.set("Parent", pages_id);
        doc.objects.insert(id, Object::Dictionary(page));
    }

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

    // Info dictionaries, forms and name trees hung off the dropped catalogs.
    let pruned = doc.prune_objects();
    log::debug!("Pruned {} unreferenced objects", pruned.len());
    doc.renumber_objects();
    doc.compress();
    doc
}
