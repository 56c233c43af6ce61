//! Pagination and order resolution

use crate::{QueryError, Result};
use jobarch_core::{OrderBy, OrderClause, PageRequest, SortDirection, SortField, Window};

/// Page size applied when the caller does not ask for one
pub const DEFAULT_ITEMS_PER_PAGE: usize = 50;

/// Validated window and ordering for a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPage {
    pub window: Window,
    pub order: OrderClause,
}

/// Resolve a page request and sort request.
///
/// Without a page request the first [`DEFAULT_ITEMS_PER_PAGE`] items are
/// returned. Without a sort request jobs are ordered by ascending id.
pub fn resolve(page: Option<&PageRequest>, order: Option<&OrderBy>) -> Result<ResolvedPage> {
    let order = match order {
        Some(order) => resolve_order(order)?,
        None => OrderClause::new(SortField::Id, SortDirection::Asc),
    };

    let window = match page {
        Some(page) => resolve_window(page)?,
        None => Window::new(DEFAULT_ITEMS_PER_PAGE, 0),
    };

    Ok(ResolvedPage { window, order })
}

fn resolve_order(order: &OrderBy) -> Result<OrderClause> {
    let field = SortField::from_name(&order.field)
        .ok_or_else(|| QueryError::InvalidSortField(order.field.clone()))?;
    let direction: SortDirection = order
        .order
        .parse()
        .map_err(|_| QueryError::invalid_filter("sort direction must be ASC or DESC"))?;
    Ok(OrderClause::new(field, direction))
}

fn resolve_window(page: &PageRequest) -> Result<Window> {
    if page.items_per_page < 1 {
        return Err(QueryError::InvalidPageRequest(
            "itemsPerPage must be at least 1".to_string(),
        ));
    }
    if page.page < 1 {
        return Err(QueryError::InvalidPageRequest(
            "page must be at least 1".to_string(),
        ));
    }

    let offset = (page.page - 1)
        .checked_mul(page.items_per_page)
        .and_then(|offset| usize::try_from(offset).ok())
        .ok_or_else(|| QueryError::InvalidPageRequest("page offset overflows".to_string()))?;
    let limit = usize::try_from(page.items_per_page)
        .map_err(|_| QueryError::InvalidPageRequest("itemsPerPage is too large".to_string()))?;

    Ok(Window::new(limit, offset))
}
