//! The paginated search cursor.
//!
//! A directory server caps the number of entries one search response may
//! carry; retrieving a large result set means re-issuing the same request
//! with an opaque continuation cookie until the server reports the last
//! page. [`PagedSearchCursor`] hides that protocol behind a plain iterator
//! of entries: lazy, forward-only, finite, not restartable (a second
//! traversal needs a new cursor).

use tracing::warn;

use crate::error::{ClientError, ClientResult};

/// Scope of a directory search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// The base entry only.
    Base,
    /// Immediate children of the base entry.
    OneLevel,
    /// The base entry and its whole subtree.
    Subtree,
}

/// One search specification, re-issued verbatim for every page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// DN the search starts from.
    pub base_dn: String,
    /// Search scope.
    pub scope: SearchScope,
    /// LDAP filter string.
    pub filter: String,
    /// Attributes to request, in positional order.
    pub attributes: Vec<String>,
}

impl SearchRequest {
    /// Creates a subtree-scoped search request.
    pub fn subtree(
        base_dn: impl Into<String>,
        filter: impl Into<String>,
        attributes: Vec<String>,
    ) -> Self {
        Self {
            base_dn: base_dn.into(),
            scope: SearchScope::Subtree,
            filter: filter.into(),
            attributes,
        }
    }
}

/// One page of search results plus the continuation cookie.
///
/// Owned by the cursor for the duration of one fetch; never retained past
/// the page boundary.
#[derive(Debug, Clone)]
pub struct SearchPage<E> {
    /// Entries in this page, in server order.
    pub entries: Vec<E>,
    /// Continuation cookie for the next page; `None` or empty on the last
    /// page.
    pub cookie: Option<Vec<u8>>,
}

impl<E> SearchPage<E> {
    /// Creates the final page of a search.
    pub fn last(entries: Vec<E>) -> Self {
        Self {
            entries,
            cookie: None,
        }
    }

    /// Creates an intermediate page with a continuation cookie.
    pub fn with_cookie(entries: Vec<E>, cookie: Vec<u8>) -> Self {
        Self {
            entries,
            cookie: Some(cookie),
        }
    }

    /// Returns true if the server signalled this is the last page.
    pub fn is_last(&self) -> bool {
        match &self.cookie {
            None => true,
            Some(cookie) => cookie.is_empty(),
        }
    }
}

/// A connection capable of executing one page request of a paged search.
pub trait PagedSearchSource {
    /// The entry type a page carries.
    type Entry;

    /// Executes `request` with the page-size control, resuming from
    /// `cookie` if one is given, and returns the resulting page.
    fn fetch_page(
        &mut self,
        request: &SearchRequest,
        page_size: u32,
        cookie: Option<&[u8]>,
    ) -> ClientResult<SearchPage<Self::Entry>>;
}

impl<S: PagedSearchSource + ?Sized> PagedSearchSource for &mut S {
    type Entry = S::Entry;

    fn fetch_page(
        &mut self,
        request: &SearchRequest,
        page_size: u32,
        cookie: Option<&[u8]>,
    ) -> ClientResult<SearchPage<Self::Entry>> {
        (**self).fetch_page(request, page_size, cookie)
    }
}

/// Lazily yields every entry of a paged search, one page at a time.
///
/// At most one page request is outstanding at any moment and the next page
/// is only fetched once the buffered one is fully consumed; there is no
/// read-ahead. Iteration terminates when the server returns an absent or
/// zero-length cookie and the buffered entries are drained. A page-fetch
/// failure is yielded once as an error, after which the cursor is exhausted.
pub struct PagedSearchCursor<S: PagedSearchSource> {
    source: S,
    request: SearchRequest,
    page_size: u32,
    buffer: std::vec::IntoIter<S::Entry>,
    cookie: Option<Vec<u8>>,
    pages_fetched: u64,
    last_page_fetched: bool,
    failed: bool,
}

impl<S: PagedSearchSource> PagedSearchCursor<S> {
    /// Creates a cursor over `source` for `request`, fetching pages of at
    /// most `page_size` entries.
    pub fn new(source: S, request: SearchRequest, page_size: u32) -> Self {
        Self {
            source,
            request,
            page_size,
            buffer: Vec::new().into_iter(),
            cookie: None,
            pages_fetched: 0,
            last_page_fetched: false,
            failed: false,
        }
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    fn fetch_next_page(&mut self) -> ClientResult<()> {
        debug_assert!(
            self.buffer.len() == 0,
            "previous page must be fully consumed before fetching the next"
        );
        let page = self
            .source
            .fetch_page(&self.request, self.page_size, self.cookie.as_deref())?;
        self.last_page_fetched = page.is_last();
        if self.pages_fetched > 0 && page.entries.is_empty() && !self.last_page_fetched {
            // Some servers transiently return an empty intermediate page;
            // only the cookie decides termination.
            warn!(
                page = self.pages_fetched + 1,
                filter = %self.request.filter,
                "paged search returned an empty intermediate page"
            );
        }
        self.pages_fetched += 1;
        self.cookie = page.cookie;
        self.buffer = page.entries.into_iter();
        Ok(())
    }
}

impl<S: PagedSearchSource> Iterator for PagedSearchCursor<S> {
    type Item = ClientResult<S::Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffer.next() {
                return Some(Ok(entry));
            }
            if self.failed || (self.pages_fetched > 0 && self.last_page_fetched) {
                return None;
            }
            if let Err(e) = self.fetch_next_page() {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Serves a scripted sequence of pages and records the cookies it was
    /// handed.
    struct ScriptedSource {
        pages: VecDeque<SearchPage<u32>>,
        cookies_seen: Vec<Option<Vec<u8>>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<SearchPage<u32>>) -> Self {
            Self {
                pages: pages.into(),
                cookies_seen: Vec::new(),
            }
        }
    }

    impl PagedSearchSource for ScriptedSource {
        type Entry = u32;

        fn fetch_page(
            &mut self,
            _request: &SearchRequest,
            _page_size: u32,
            cookie: Option<&[u8]>,
        ) -> ClientResult<SearchPage<u32>> {
            self.cookies_seen.push(cookie.map(|c| c.to_vec()));
            self.pages
                .pop_front()
                .ok_or_else(|| ClientError::communication("no scripted page left"))
        }
    }

    fn request() -> SearchRequest {
        SearchRequest::subtree(
            "OU=People,DC=example,DC=com",
            "(objectClass=user)",
            vec!["cn".into()],
        )
    }

    fn collect(cursor: PagedSearchCursor<ScriptedSource>) -> (Vec<u32>, Vec<ClientError>) {
        let mut entries = Vec::new();
        let mut errors = Vec::new();
        for item in cursor {
            match item {
                Ok(e) => entries.push(e),
                Err(e) => errors.push(e),
            }
        }
        (entries, errors)
    }

    #[test]
    fn yields_all_entries_across_pages() {
        let source = ScriptedSource::new(vec![
            SearchPage::with_cookie(vec![1, 2, 3], b"c1".to_vec()),
            SearchPage::with_cookie(vec![4, 5, 6], b"c2".to_vec()),
            SearchPage::with_cookie(vec![7, 8, 9], b"c3".to_vec()),
            SearchPage::last(vec![10]),
        ]);
        let cursor = PagedSearchCursor::new(source, request(), 3);

        let (entries, errors) = collect(cursor);
        assert_eq!(entries, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert!(errors.is_empty());
    }

    #[test]
    fn passes_the_last_seen_cookie_on_each_fetch() {
        let mut source = ScriptedSource::new(vec![
            SearchPage::with_cookie(vec![1], b"c1".to_vec()),
            SearchPage::with_cookie(vec![2], b"c2".to_vec()),
            SearchPage::last(vec![3]),
        ]);
        // A cursor can borrow its source, leaving it inspectable afterwards.
        let mut cursor = PagedSearchCursor::new(&mut source, request(), 1);
        for item in cursor.by_ref() {
            item.unwrap();
        }
        assert_eq!(cursor.pages_fetched(), 3);
        drop(cursor);

        assert_eq!(
            source.cookies_seen,
            vec![None, Some(b"c1".to_vec()), Some(b"c2".to_vec())]
        );
    }

    #[test]
    fn empty_intermediate_page_does_not_terminate() {
        let source = ScriptedSource::new(vec![
            SearchPage::with_cookie(vec![1, 2], b"c1".to_vec()),
            SearchPage::with_cookie(vec![], b"c2".to_vec()),
            SearchPage::last(vec![3, 4]),
        ]);
        let cursor = PagedSearchCursor::new(source, request(), 2);

        let (entries, errors) = collect(cursor);
        assert_eq!(entries, vec![1, 2, 3, 4]);
        assert!(errors.is_empty());
    }

    #[test]
    fn empty_cookie_terminates_like_a_missing_one() {
        let source = ScriptedSource::new(vec![SearchPage::with_cookie(
            vec![1, 2],
            Vec::new(),
        )]);
        let cursor = PagedSearchCursor::new(source, request(), 2);

        let (entries, errors) = collect(cursor);
        assert_eq!(entries, vec![1, 2]);
        assert!(errors.is_empty());
    }

    #[test]
    fn empty_first_page_yields_nothing() {
        let source = ScriptedSource::new(vec![SearchPage::last(vec![])]);
        let cursor = PagedSearchCursor::new(source, request(), 5);

        let (entries, errors) = collect(cursor);
        assert!(entries.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn fetch_failure_ends_the_sequence_with_one_error() {
        let source = ScriptedSource::new(vec![SearchPage::with_cookie(
            vec![1, 2],
            b"c1".to_vec(),
        )]);
        let mut cursor = PagedSearchCursor::new(source, request(), 2);

        assert_eq!(cursor.next().unwrap().unwrap(), 1);
        assert_eq!(cursor.next().unwrap().unwrap(), 2);
        // The scripted source is out of pages: the next fetch fails.
        assert!(cursor.next().unwrap().is_err());
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn no_fetch_happens_before_the_first_pull() {
        let source = ScriptedSource::new(vec![SearchPage::last(vec![1])]);
        let cursor = PagedSearchCursor::new(source, request(), 1);
        assert_eq!(cursor.pages_fetched(), 0);
        assert!(cursor.source.cookies_seen.is_empty());
    }
}
