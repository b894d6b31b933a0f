use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// `?page=` and `?page_size=` query parameters, 1-based.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

impl PageParams {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.page_size()
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub results: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

impl<T> Paginated<T> {
    pub fn new(results: Vec<T>, total: i64, params: &PageParams) -> Self {
        Self {
            results,
            total,
            page: params.page(),
            page_size: params.page_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let p = PageParams {
            page: None,
            page_size: None,
        };
        assert_eq!(p.page(), 1);
        assert_eq!(p.page_size(), 20);
        assert_eq!(p.offset(), 0);

        let p = PageParams {
            page: Some(3),
            page_size: Some(500),
        };
        assert_eq!(p.page_size(), 100);
        assert_eq!(p.offset(), 200);

        let p = PageParams {
            page: Some(-1),
            page_size: Some(0),
        };
        assert_eq!(p.page(), 1);
        assert_eq!(p.page_size(), 1);
    }
}
