use derive_more::Constructor;
use std::ops::AddAssign;
use url::Url;

pub(crate) const FIRST_PAGE_NUMBER: u32 = 1;

#[derive(Constructor, Debug, PartialEq, Eq)]
pub(crate) struct Page {
    pub page_no: u32,
    pub page_size: u32,
}

/// Hands out pages until `max_pages` have been requested.
#[derive(Debug)]
pub(crate) struct Paginator {
    page_no: u32,
    page_size: u32,
    max_pages: u32,
}

impl Paginator {
    pub(crate) fn new(page_size: u32, max_pages: u32) -> Self {
        Paginator {
            page_no: FIRST_PAGE_NUMBER,
            page_size,
            max_pages,
        }
    }

    pub(crate) fn next_page(&mut self) -> Option<Page> {
        if self.page_no >= FIRST_PAGE_NUMBER + self.max_pages {
            return None;
        }
        let page = Page::new(self.page_no, self.page_size);
        self.page_no.add_assign(1);
        Some(page)
    }
}

/// Page number of the `rel="last"` entry of a `Link` header.
///
/// `<https://api.github.com/repositories/1/contributors?per_page=1&page=2>; rel="next", <...&page=42>; rel="last"`
pub(crate) fn last_page(link: &str) -> Option<u64> {
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_last = params
            .split(';')
            .any(|param| param.trim().replace(' ', "") == r#"rel="last""#);
        if !is_last {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        let url = Url::parse(target).ok()?;
        let page = url.query_pairs().find(|(key, _)| key == "page")?.1;
        page.parse().ok()
    })
}

/// Tests

#[test]
fn paginator_test() {
    let mut paginator = Paginator::new(100, 3);
    assert_eq!(paginator.next_page(), Some(Page::new(1, 100)));
    assert_eq!(paginator.next_page(), Some(Page::new(2, 100)));
    assert_eq!(paginator.next_page(), Some(Page::new(3, 100)));
    assert_eq!(paginator.next_page(), None);
    assert_eq!(Paginator::new(100, 0).next_page(), None);
}

#[test]
fn last_page_test() {
    let link = r#"<https://api.github.com/repositories/724712/contributors?per_page=1&anon=true&page=2>; rel="next", <https://api.github.com/repositories/724712/contributors?per_page=1&anon=true&page=5412>; rel="last""#;
    assert_eq!(last_page(link), Some(5412));

    let first_in_list = r#"<https://api.github.com/r/c?page=7&per_page=1>; rel="last", <https://api.github.com/r/c?page=1&per_page=1>; rel="first""#;
    assert_eq!(last_page(first_in_list), Some(7));
}

#[test]
fn last_page_missing_test() {
    let link = r#"<https://api.github.com/r/c?per_page=1&page=1>; rel="prev", <https://api.github.com/r/c?per_page=1&page=1>; rel="first""#;
    assert_eq!(last_page(link), None);
    assert_eq!(last_page(r#"<not a url>; rel="last""#), None);
    assert_eq!(last_page(""), None);
}
