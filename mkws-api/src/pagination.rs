//! Pagination parameter clamping for list endpoints

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Sanitized page/limit pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

/// Clamp raw query parameters into valid bounds.
pub fn clamp(page: Option<i64>, limit: Option<i64>) -> Page {
    Page {
        page: page.unwrap_or(1).max(1),
        limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_absent() {
        assert_eq!(clamp(None, None), Page { page: 1, limit: DEFAULT_LIMIT });
    }

    #[test]
    fn out_of_range_values_clamp() {
        assert_eq!(clamp(Some(0), Some(0)), Page { page: 1, limit: 1 });
        assert_eq!(clamp(Some(-5), Some(9999)), Page { page: 1, limit: MAX_LIMIT });
        assert_eq!(clamp(Some(3), Some(25)), Page { page: 3, limit: 25 });
    }
}
