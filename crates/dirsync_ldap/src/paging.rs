//! One-page search execution against a live `ldap3` connection.
//!
//! This is the [`PagedSearchSource`] the core cursor drives: each call runs
//! the request once with a simple-paged-results control carrying the given
//! cookie, and hands back the page plus the cookie the server returned.

use ldap3::controls::{Control, ControlType, PagedResults, RawControl};
use ldap3::{LdapConn, Scope, SearchEntry};

use dirsync_core::{
    ClientError, ClientResult, PagedSearchSource, SearchPage, SearchRequest, SearchScope,
};

pub(crate) fn ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Executes single pages of a paged search on a borrowed connection,
/// optionally attaching extra request controls (used for the show-deleted
/// control on tombstone searches).
pub(crate) struct PagedConn<'a> {
    pub(crate) conn: &'a mut LdapConn,
    pub(crate) extra_controls: Vec<RawControl>,
}

impl PagedSearchSource for PagedConn<'_> {
    type Entry = SearchEntry;

    fn fetch_page(
        &mut self,
        request: &SearchRequest,
        page_size: u32,
        cookie: Option<&[u8]>,
    ) -> ClientResult<SearchPage<SearchEntry>> {
        let paged = PagedResults {
            size: page_size as i32,
            cookie: cookie.map(|c| c.to_vec()).unwrap_or_default(),
        };
        let mut paged: RawControl = paged.into();
        paged.crit = true;

        let mut controls = self.extra_controls.clone();
        controls.push(paged);

        let result = self
            .conn
            .with_controls(controls)
            .search(
                &request.base_dn,
                ldap_scope(request.scope),
                &request.filter,
                request.attributes.clone(),
            )
            .map_err(|e| ClientError::communication(e.to_string()))?;
        let (entries, response) = result
            .success()
            .map_err(|e| ClientError::communication(e.to_string()))?;

        let mut next_cookie = None;
        for control in response.ctrls {
            if let Control(Some(ControlType::PagedResults), raw) = control {
                let parsed: PagedResults = raw.parse();
                if !parsed.cookie.is_empty() {
                    next_cookie = Some(parsed.cookie);
                }
            }
        }

        let entries = entries.into_iter().map(SearchEntry::construct).collect();
        Ok(match next_cookie {
            Some(cookie) => SearchPage::with_cookie(entries, cookie),
            None => SearchPage::last(entries),
        })
    }
}
