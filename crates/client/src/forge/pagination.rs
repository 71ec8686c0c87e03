//! Page-by-page listing.
//!
//! The forge reports the last page number in the `Link` response header
//! (`rel="last"`). The header is absent on the last page itself, which reads
//! as `last_page == 0` and ends the walk.

use std::future::Future;

use reqwest::header::{HeaderMap, LINK};

use super::ForgeError;

/// Page request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Last page number advertised by the forge; 0 when not advertised.
    pub last_page: u32,
}

impl<T> Page<T> {
    /// A single page with nothing after it.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, last_page: 0 }
    }
}

/// Read the `rel="last"` page number from a `Link` header.
pub fn last_page(headers: &HeaderMap) -> u32 {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .find_map(parse_last_link)
        .unwrap_or(0)
}

fn parse_last_link(link: &str) -> Option<u32> {
    let mut parts = link.split(';');
    let target = parts.next()?.trim();
    let is_last = parts.any(|p| {
        let p = p.trim();
        p == "rel=\"last\"" || p == "rel=last"
    });
    if !is_last {
        return None;
    }

    let target = target.strip_prefix('<')?.strip_suffix('>')?;
    let url = url::Url::parse(target).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
}

/// Walk every page of a list endpoint, starting at page 1.
///
/// Continues while the current page is below the advertised last page.
pub async fn collect_pages<T, F, Fut>(page_size: u32, mut fetch: F) -> Result<Vec<T>, ForgeError>
where
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = Result<Page<T>, ForgeError>>,
{
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let batch = fetch(ListOptions { page, page_size }).await?;
        items.extend(batch.items);
        if page >= batch.last_page {
            break;
        }
        page += 1;
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_last_page_from_link() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                "<https://forge.example/api/v1/repos/a/b/branches?limit=100&page=2>; rel=\"next\",\
                 <https://forge.example/api/v1/repos/a/b/branches?limit=100&page=4>; rel=\"last\"",
            ),
        );
        assert_eq!(last_page(&headers), 4);
    }

    #[test]
    fn test_last_page_missing() {
        assert_eq!(last_page(&HeaderMap::new()), 0);

        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static("<https://forge.example/x?page=1>; rel=\"first\""),
        );
        assert_eq!(last_page(&headers), 0);
    }

    #[tokio::test]
    async fn test_collect_pages_walks_to_last() {
        let mut requested = Vec::new();
        let items = collect_pages(2, |opts| {
            requested.push(opts.page);
            async move {
                let items = vec![opts.page * 10, opts.page * 10 + 1];
                let last_page = if opts.page < 3 { 3 } else { 0 };
                Ok(Page { items, last_page })
            }
        })
        .await
        .unwrap();

        assert_eq!(requested, [1, 2, 3]);
        assert_eq!(items, [10, 11, 20, 21, 30, 31]);
    }

    #[tokio::test]
    async fn test_collect_pages_propagates_errors() {
        let result: Result<Vec<u32>, _> = collect_pages(100, |opts| async move {
            if opts.page == 2 { Err(ForgeError::Timeout) } else { Ok(Page { items: vec![1], last_page: 5 }) }
        })
        .await;

        assert!(matches!(result, Err(ForgeError::Timeout)));
    }
}
