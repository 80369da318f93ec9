//! Bounds for catalog id queries

use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, Result};
use crate::models::ItemId;

/// Bounding parameters for a catalog query
///
/// `offset` and `page` are mutually exclusive; `page` is 1-based. Both are
/// ignored without a `limit`, which means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBounds {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub page: Option<u32>,
}

impl QueryBounds {
    /// Unbounded query
    ///
    /// # Examples
    ///
    /// ```
    /// use core_library::repositories::QueryBounds;
    ///
    /// let bounds = QueryBounds::all().with_limit(50).with_page(3);
    /// assert_eq!(bounds.resolved_offset(), 100);
    /// ```
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.offset.is_some() && self.page.is_some() {
            return Err(LibraryError::InvalidInput {
                field: "page".to_string(),
                message: "page and offset cannot be combined".to_string(),
            });
        }
        Ok(())
    }

    /// Offset to apply: `max(0, (page - 1) * limit)` when paging, otherwise
    /// the explicit offset (default 0). Always 0 for an unbounded query.
    pub fn resolved_offset(&self) -> u32 {
        let Some(limit) = self.limit else {
            return 0;
        };
        match self.page {
            Some(page) => page.saturating_sub(1).saturating_mul(limit),
            None => self.offset.unwrap_or(0),
        }
    }

    /// SQLite `LIMIT` value; `-1` means no limit
    pub fn sql_limit(&self) -> i64 {
        self.limit.map(i64::from).unwrap_or(-1)
    }
}

/// Ordered ids of one bounded query plus the unbounded total
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPage {
    pub ids: Vec<ItemId>,
    /// Number of matching items in the whole catalog
    pub total: u64,
}

impl IdPage {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_to_offset() {
        let bounds = QueryBounds::all().with_limit(25).with_page(1);
        assert_eq!(bounds.resolved_offset(), 0);

        let bounds = QueryBounds::all().with_limit(25).with_page(4);
        assert_eq!(bounds.resolved_offset(), 75);

        // Page 0 clamps to the first page
        let bounds = QueryBounds::all().with_limit(25).with_page(0);
        assert_eq!(bounds.resolved_offset(), 0);
    }

    #[test]
    fn test_explicit_offset() {
        let bounds = QueryBounds::all().with_limit(10).with_offset(7);
        assert_eq!(bounds.resolved_offset(), 7);
        assert_eq!(bounds.sql_limit(), 10);
    }

    #[test]
    fn test_offset_without_limit_is_ignored() {
        let bounds = QueryBounds::all().with_offset(7);
        assert_eq!(bounds.resolved_offset(), 0);
        assert_eq!(bounds.sql_limit(), -1);

        let bounds = QueryBounds::all().with_page(3);
        assert_eq!(bounds.resolved_offset(), 0);
    }

    #[test]
    fn test_unbounded() {
        let bounds = QueryBounds::all();
        assert_eq!(bounds.resolved_offset(), 0);
        assert_eq!(bounds.sql_limit(), -1);
        assert!(bounds.validate().is_ok());
    }

    #[test]
    fn test_offset_and_page_are_exclusive() {
        let bounds = QueryBounds::all().with_limit(10).with_offset(5).with_page(2);
        assert!(matches!(
            bounds.validate(),
            Err(LibraryError::InvalidInput { .. })
        ));
    }
}
