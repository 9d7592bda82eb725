use std::collections::BTreeMap;

/// Entries kept before the oldest ones are evicted.
pub const DEFAULT_CAPACITY: usize = 2000;

/// Elements handed out to the engine, keyed by handle id (`e<n>`).
///
/// The table belongs to one page: it is emptied whenever the page URL seen
/// by a lookup differs from the one it was filled on, and it never holds
/// more than `capacity` entries.
pub struct ElementTable<T> {
    entries: BTreeMap<u64, T>,
    next_id: u64,
    page: Option<String>,
    capacity: usize,
}

impl<T: Clone> ElementTable<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 0,
            page: None,
            capacity: capacity.max(1),
        }
    }

    /// Record the page about to be queried. Returns true when the table
    /// was emptied because the page changed.
    pub fn sync_page(&mut self, url: &str) -> bool {
        if self.page.as_deref() == Some(url) {
            return false;
        }
        let dropped = !self.entries.is_empty();
        self.entries.clear();
        self.page = Some(url.to_string());
        dropped
    }

    pub fn insert(&mut self, value: T) -> String {
        self.next_id += 1;
        self.entries.insert(self.next_id, value);
        while self.entries.len() > self.capacity {
            self.entries.pop_first();
        }
        format!("e{}", self.next_id)
    }

    pub fn get(&self, id: &str) -> Option<T> {
        let key = id.strip_prefix('e')?.parse::<u64>().ok()?;
        self.entries.get(&key).cloned()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.page = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> Default for ElementTable<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_resolvable() {
        let mut table = ElementTable::new(10);
        let a = table.insert(1u32);
        let b = table.insert(2u32);
        assert_eq!(a, "e1");
        assert_eq!(b, "e2");
        assert_eq!(table.get("e2"), Some(2));
        assert_eq!(table.get("x2"), None);
        assert_eq!(table.get("e9"), None);
    }

    #[test]
    fn test_oldest_entries_are_evicted() {
        let mut table = ElementTable::new(3);
        let ids: Vec<String> = (0..5u32).map(|v| table.insert(v)).collect();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(&ids[0]), None);
        assert_eq!(table.get(&ids[1]), None);
        assert_eq!(table.get(&ids[4]), Some(4));
    }

    #[test]
    fn test_page_change_empties_table() {
        let mut table = ElementTable::new(10);
        assert!(!table.sync_page("https://portal/home"));
        let id = table.insert(7u32);
        assert!(!table.sync_page("https://portal/home"));
        assert_eq!(table.get(&id), Some(7));

        assert!(table.sync_page("https://portal/emissao"));
        assert!(table.is_empty());
        assert_eq!(table.get(&id), None);

        // Ids keep increasing across pages.
        assert_eq!(table.insert(8u32), "e2");
    }
}
