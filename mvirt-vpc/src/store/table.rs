use std::collections::HashMap;

/// Id-keyed table remembering insertion order.
///
/// Replacing an existing row keeps its original position.
#[derive(Debug, Clone)]
pub struct Table<T> {
    rows: HashMap<String, (u64, T)>,
    next_seq: u64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> Table<T> {
    pub fn get(&self, id: &str) -> Option<&T> {
        self.rows.get(id).map(|(_, row)| row)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.rows.get_mut(id).map(|(_, row)| row)
    }

    pub fn insert(&mut self, id: String, row: T) {
        match self.rows.get_mut(&id) {
            Some(slot) => slot.1 = row,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.rows.insert(id, (seq, row));
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.rows.remove(id).map(|(_, row)| row)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    /// Rows in insertion order.
    pub fn values(&self) -> Vec<&T> {
        let mut rows: Vec<&(u64, T)> = self.rows.values().collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, row)| row).collect()
    }

    pub fn values_unordered(&self) -> impl Iterator<Item = &T> {
        self.rows.values().map(|(_, row)| row)
    }

    pub fn values_mut_unordered(&mut self) -> impl Iterator<Item = &mut T> {
        self.rows.values_mut().map(|(_, row)| row)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
