//! Result types for find

use crate::item::Item;

/// A page of matching items
#[derive(Debug, Clone, PartialEq)]
pub struct ItemList {
    /// Matches before the window was applied
    pub total: usize,
    /// Leading matches skipped
    pub offset: usize,
    /// Requested page size, `None` for unbounded
    pub limit: Option<usize>,
    /// Items in result order
    pub items: Vec<Item>,
}

impl ItemList {
    /// Returns true if the page holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items in the page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns an iterator over the items
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    /// Ids of the items, in result order
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.id.as_str()).collect()
    }

    /// Returns true if matches exist past this page
    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }
}

impl IntoIterator for ItemList {
    type Item = Item;
    type IntoIter = std::vec::IntoIter<Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_accessors() {
        let list = ItemList {
            total: 3,
            offset: 1,
            limit: Some(1),
            items: vec![Item::new("b", "e")],
        };
        assert_eq!(list.len(), 1);
        assert!(!list.is_empty());
        assert_eq!(list.ids(), vec!["b"]);
        assert!(list.has_more());
        assert_eq!(list.iter().count(), 1);
    }

    #[test]
    fn test_last_page() {
        let list = ItemList {
            total: 1,
            offset: 0,
            limit: None,
            items: vec![Item::new("a", "e")],
        };
        assert!(!list.has_more());
    }
}
