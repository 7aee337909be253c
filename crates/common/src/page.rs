//! Offset pagination shared by repositories and the HTTP layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Rejected page request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("Page size must be between 1 and {max}, got {size}")]
    InvalidSize { size: u32, max: u32 },
}

/// A zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    size: u32,
}

impl PageRequest {
    /// Creates a page request, rejecting sizes outside `1..=MAX_PAGE_SIZE`.
    pub fn new(page: u32, size: u32) -> Result<Self, PageError> {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(PageError::InvalidSize {
                size,
                max: MAX_PAGE_SIZE,
            });
        }
        Ok(Self { page, size })
    }

    /// First page with the default size.
    pub fn first() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

/// One page of results plus the totals needed to navigate the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
    pub first: bool,
    pub last: bool,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    /// Builds a page from its content and the total number of matching rows.
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        let size = request.size() as u64;
        let total_pages = total_elements.div_ceil(size);
        let number = request.page();
        let has_next = (number as u64 + 1) < total_pages;
        let has_previous = number > 0;

        Self {
            content,
            number,
            size: request.size(),
            total_elements,
            total_pages,
            first: !has_previous,
            last: !has_next,
            has_next,
            has_previous,
        }
    }

    /// Slices an already sorted, fully materialized result set.
    pub fn from_all(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let content = all
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.size() as usize)
            .collect();
        Self::new(content, request, total)
    }

    /// Maps the content, keeping the paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            first: self.first,
            last: self.last,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_sizes() {
        assert!(PageRequest::new(0, 0).is_err());
        assert!(PageRequest::new(0, MAX_PAGE_SIZE + 1).is_err());
        assert!(PageRequest::new(3, MAX_PAGE_SIZE).is_ok());
    }

    #[test]
    fn offset_is_page_times_size() {
        let request = PageRequest::new(2, 10).unwrap();
        assert_eq!(request.offset(), 20);
    }

    #[test]
    fn middle_page_flags() {
        let page = Page::new(vec![1, 2], PageRequest::new(1, 2).unwrap(), 5);
        assert_eq!(page.total_pages, 3);
        assert!(!page.first);
        assert!(!page.last);
        assert!(page.has_next);
        assert!(page.has_previous);
    }

    #[test]
    fn empty_result_is_first_and_last() {
        let page: Page<i32> = Page::new(vec![], PageRequest::first(), 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.first);
        assert!(page.last);
        assert!(!page.has_next);
    }

    #[test]
    fn from_all_slices_requested_window() {
        let page = Page::from_all((1..=7).collect(), PageRequest::new(1, 3).unwrap());
        assert_eq!(page.content, vec![4, 5, 6]);
        assert_eq!(page.total_elements, 7);
        assert!(page.has_next);
    }
}
