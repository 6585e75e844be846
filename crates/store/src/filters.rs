// View state: per-sheet filter conditions.
//
// Filters live in process memory, never in the workbook file. The
// store is injected wherever it is consulted so the engine stays
// testable without process-wide state.

use std::collections::HashMap;
use std::sync::Mutex;

use gridagent_core::SheetId;

/// Ordered list of SQL boolean conditions per sheet, AND-composed at
/// read time.
pub trait FilterStore {
    fn conditions(&self, sheet_id: SheetId) -> Vec<String>;
    fn add(&self, sheet_id: SheetId, condition: &str);
    fn clear(&self, sheet_id: SheetId);
}

/// In-memory filter store.
#[derive(Debug, Default)]
pub struct MemoryFilterStore {
    inner: Mutex<HashMap<SheetId, Vec<String>>>,
}

impl MemoryFilterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FilterStore for MemoryFilterStore {
    fn conditions(&self, sheet_id: SheetId) -> Vec<String> {
        self.inner
            .lock()
            .map(|m| m.get(&sheet_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn add(&self, sheet_id: SheetId, condition: &str) {
        if let Ok(mut m) = self.inner.lock() {
            m.entry(sheet_id).or_default().push(condition.to_string());
        }
    }

    fn clear(&self, sheet_id: SheetId) {
        if let Ok(mut m) = self.inner.lock() {
            m.remove(&sheet_id);
        }
    }
}
