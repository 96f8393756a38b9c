pub mod device_token;
pub mod notification;
pub mod preference;
pub mod template;

use crate::error::ApiError;
use worklink_services::dao::base::PaginationParams;

/// Pagination query values with defaults applied. Explicit zeros are caller
/// errors, not values to silently correct.
pub(crate) fn pagination(
    page: Option<u64>,
    per_page: Option<u64>,
) -> Result<PaginationParams, ApiError> {
    if page == Some(0) {
        return Err(ApiError::Validation("page must be at least 1".to_string()));
    }
    if per_page == Some(0) {
        return Err(ApiError::Validation("per_page must be at least 1".to_string()));
    }
    let defaults = PaginationParams::default();
    Ok(PaginationParams {
        page: page.unwrap_or(defaults.page),
        per_page: per_page.unwrap_or(defaults.per_page),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_per_page_is_rejected() {
        assert!(pagination(None, Some(0)).is_err());
        assert!(pagination(Some(0), None).is_err());
    }

    #[test]
    fn absent_values_fall_back_to_defaults() {
        let params = pagination(None, None).unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 25);
    }

    #[test]
    fn explicit_values_pass_through() {
        let params = pagination(Some(2), Some(50)).unwrap();
        assert_eq!(params.page, 2);
        assert_eq!(params.per_page, 50);
    }
}
