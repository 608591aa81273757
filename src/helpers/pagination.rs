use serde::{Deserialize, Serialize};

/// 默认每页数量
pub const DEFAULT_PER_PAGE: i64 = 12;
/// 每页数量上限
pub const MAX_PER_PAGE: i64 = 100;
/// 页码上限，保证偏移量不会溢出
pub const MAX_PAGE: i64 = i64::MAX / MAX_PER_PAGE;

/// 分页查询参数
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// 分页信息
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
}

/// 带分页信息的列表
#[derive(Clone, Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl PageQuery {
    // 若用户传入的 page ≤ 0，则统一视为第 1 页
    pub fn get_page(&self) -> i64 {
        self.page.filter(|&p| p > 0).unwrap_or(1).min(MAX_PAGE)
    }

    pub fn get_per_page(&self) -> i64 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    pub fn get_offset(&self) -> i64 {
        (self.get_page() - 1).saturating_mul(self.get_per_page())
    }

    /// 组合查询结果和总数
    pub fn paginate<T: Serialize>(&self, items: Vec<T>, total: i64) -> Paginated<T> {
        Paginated {
            items,
            pagination: create_pagination(self.get_page(), self.get_per_page(), total),
        }
    }
}

/// 创建分页信息
pub fn create_pagination(page: i64, per_page: i64, total: i64) -> Pagination {
    let total_pages = if per_page <= 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    };

    Pagination {
        current_page: page,
        per_page,
        total,
        total_pages,
        has_prev: page > 1,
        has_next: page < total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let query = PageQuery::default();
        assert_eq!(query.get_page(), 1);
        assert_eq!(query.get_per_page(), DEFAULT_PER_PAGE);
        assert_eq!(query.get_offset(), 0);

        let query = PageQuery {
            page: Some(-3),
            per_page: Some(1000),
        };
        assert_eq!(query.get_page(), 1);
        assert_eq!(query.get_per_page(), MAX_PER_PAGE);
    }

    #[test]
    fn offset_follows_page() {
        let query = PageQuery {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(query.get_offset(), 20);
    }

    #[test]
    fn huge_page_is_capped() {
        let query = PageQuery {
            page: Some(i64::MAX),
            per_page: Some(MAX_PER_PAGE),
        };
        assert_eq!(query.get_page(), MAX_PAGE);
        assert_eq!(query.get_offset(), (MAX_PAGE - 1) * MAX_PER_PAGE);

        let small = PageQuery {
            page: Some(i64::MAX),
            per_page: None,
        };
        assert!(small.get_offset() > 0);
    }

    #[test]
    fn page_count_rounds_up() {
        let p = create_pagination(2, 12, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_prev);
        assert!(p.has_next);

        let last = create_pagination(3, 12, 25);
        assert!(!last.has_next);
    }

    #[test]
    fn empty_result_has_no_pages() {
        let p = create_pagination(1, 12, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_prev);
        assert!(!p.has_next);
    }
}
