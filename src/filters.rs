//! Sorting and pagination for list endpoints.
//!
//! Sort fields arrive from the query string and end up interpolated into SQL, so a
//! field is only ever used after it has been found in the endpoint's safe-list.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid sort field: {0}")]
    InvalidSortField(String),
    #[error("page and page size must be positive (page={page}, page_size={page_size})")]
    InvalidPage { page: i64, page_size: i64 },
}

impl From<FilterError> for AppError {
    fn from(error: FilterError) -> AppError {
        match error {
            FilterError::InvalidSortField(_) => AppError::Conflict(error.to_string()),
            FilterError::InvalidPage { .. } => AppError::Validation(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A validated page request for one list endpoint.
#[derive(Debug, Clone)]
pub struct Filter {
    page: i64,
    page_size: i64,
    sort: String,
    sort_safe_list: &'static [&'static str],
}

impl Filter {
    /// Pages are 1-based; zero or negative pages and page sizes are rejected.
    pub fn new(
        page: i64,
        page_size: i64,
        sort: impl Into<String>,
        sort_safe_list: &'static [&'static str],
    ) -> Result<Self, FilterError> {
        if page <= 0 || page_size <= 0 {
            return Err(FilterError::InvalidPage { page, page_size });
        }
        Ok(Self {
            page,
            page_size,
            sort: sort.into(),
            sort_safe_list,
        })
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    /// The requested column without its `-` prefix, if the raw value is safe-listed.
    pub fn sort_column(&self) -> Result<&str, FilterError> {
        if self.sort_safe_list.contains(&self.sort.as_str()) {
            Ok(self.sort.trim_start_matches('-'))
        } else {
            Err(FilterError::InvalidSortField(self.sort.clone()))
        }
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        self.page_size.saturating_mul(self.page - 1)
    }

    /// `ORDER BY` body with a stable secondary key so ties always come back in
    /// the same order.
    pub fn order_by(&self, tiebreaker: &str) -> Result<String, FilterError> {
        let column = self.sort_column()?;
        if column == tiebreaker {
            return Ok(format!("{} {}", column, self.sort_direction()));
        }
        Ok(format!(
            "{} {}, {} ASC",
            column,
            self.sort_direction(),
            tiebreaker
        ))
    }
}

/// Pagination details returned alongside a page of results.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub total_records: i64,
}

impl Metadata {
    pub fn calculate(total: i64, page_size: i64, page: i64) -> Self {
        if total == 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            total_records: total,
        }
    }
}

/// Query-string parameters shared by the list endpoints.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[validate(range(min = 1, max = 10_000_000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub page_size: Option<i64>,
    pub sort: Option<String>,
    /// Optional title search term.
    #[validate(length(max = 200))]
    pub title: Option<String>,
}

impl ListQuery {
    /// Validates the parameters and builds a `Filter` against `safe_list`,
    /// falling back to `default_sort` when no sort was requested.
    pub fn to_filter(
        &self,
        default_sort: &str,
        safe_list: &'static [&'static str],
    ) -> Result<Filter, AppError> {
        self.validate()?;
        let filter = Filter::new(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
            self.sort.clone().unwrap_or_else(|| default_sort.to_string()),
            safe_list,
        )?;
        filter.sort_column()?;
        Ok(filter)
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().map(str::trim).unwrap_or("")
    }
}

/// A page of results together with its pagination metadata.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub metadata: Metadata,
}
