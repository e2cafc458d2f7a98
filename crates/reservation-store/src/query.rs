/// Pagination window for reservation listings.
///
/// Limits are clamped to `1..=MAX_LIMIT`; listings are ordered newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    limit: u32,
    offset: u32,
}

impl Page {
    /// Default number of rows per page.
    pub const DEFAULT_LIMIT: u32 = 20;

    /// Largest page a caller may request.
    pub const MAX_LIMIT: u32 = 100;

    /// Creates a page, clamping the limit into range.
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset,
        }
    }

    /// Builds a page from optional query parameters.
    pub fn from_params(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self::new(
            limit.unwrap_or(Self::DEFAULT_LIMIT),
            offset.unwrap_or_default(),
        )
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}
