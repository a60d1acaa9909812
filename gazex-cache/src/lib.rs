use lazy_static::lazy_static;
use std::sync::RwLock;
pub use string_cache::DefaultAtom as Atom;

lazy_static! {
    static ref LABEL_INTERNER: RwLock<Vec<Atom>> = RwLock::new(Vec::new());
}

/// Intern a target label and return its stable id.
///
/// Ids are process-wide and never reused, so two calls with the same label always
/// agree.
pub fn intern_label(s: &str) -> usize {
    let atom = Atom::from(s);
    {
        let labels = LABEL_INTERNER.read().unwrap_or_else(|e| e.into_inner());
        if let Some(idx) = labels.iter().position(|a| *a == atom) {
            return idx;
        }
    }
    let mut labels = LABEL_INTERNER.write().unwrap_or_else(|e| e.into_inner());
    // Another writer may have pushed the same label between the two locks.
    match labels.iter().position(|a| *a == atom) {
        Some(idx) => idx,
        None => {
            labels.push(atom);
            labels.len() - 1
        }
    }
}

/// Current count of unique labels
pub fn label_count() -> usize {
    LABEL_INTERNER
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .len()
}

/// Label for an interned id, or `None` if the id was never handed out.
pub fn get_label(id: usize) -> Option<Atom> {
    LABEL_INTERNER
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(id)
        .cloned()
}
