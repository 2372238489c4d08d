use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use std::collections::HashMap;

/// A bijection between axis labels and dense indices.
///
/// Q-tables and strategy tables address their storage by position but
/// are driven by names ("0", "1", "C", "D"), so both directions need to
/// be cheap. Insertion order is the index order.
#[derive(Debug, Clone, Default)]
pub struct BiMap {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl BiMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a label and return its index. Labels are unique.
    pub fn insert(&mut self, name: &str) -> Result<usize> {
        ensure!(
            !self.index.contains_key(name),
            "label '{}' registered twice",
            name
        );
        let id = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Index of a label. Unknown labels are data errors.
    pub fn index(&self, name: &str) -> Result<usize> {
        match self.index.get(name) {
            Some(id) => Ok(*id),
            None => bail!("unknown label '{}'", name),
        }
    }

    /// Label at an index. Indices come from this map, so out of range is
    /// a caller bug rather than a data error.
    pub fn name(&self, index: usize) -> &str {
        assert!(index < self.names.len(), "label index {} out of range", index);
        &self.names[index]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
    pub fn len(&self) -> usize {
        self.names.len()
    }
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl From<&[&str]> for BiMap {
    fn from(names: &[&str]) -> Self {
        let mut map = Self::new();
        for name in names {
            map.insert(name).expect("axis labels are unique");
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_insertion_order() {
        let map = BiMap::from(["C", "D"].as_slice());
        assert_eq!(map.index("C").unwrap(), 0);
        assert_eq!(map.index("D").unwrap(), 1);
        assert_eq!(map.name(0), "C");
        assert_eq!(map.name(1), "D");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn duplicates_and_unknowns_are_rejected() {
        let mut map = BiMap::new();
        map.insert("C").unwrap();
        assert!(map.insert("C").is_err());
        assert!(map.index("D").unwrap_err().to_string().contains("'D'"));
    }
}
