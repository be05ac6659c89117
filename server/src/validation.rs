use crate::error::ApiError;

/// Maximum instrument name length, in characters
const MAX_PRODUCT_LENGTH: usize = 100;
/// Maximum style description length, in characters
const MAX_STYLE_LENGTH: usize = 200;
/// Longest clip a single request may ask for, in seconds
pub const MAX_DURATION_SECS: f64 = 30.0;

/// Validate a demo-audio request
pub fn validate_demo_request(product: &str, style: &str, duration: f64) -> Result<(), ApiError> {
    if product.trim().is_empty() {
        return Err(ApiError::InvalidInput("Product cannot be empty".to_string()));
    }
    if product.chars().count() > MAX_PRODUCT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Product name too long (max {} characters)",
            MAX_PRODUCT_LENGTH
        )));
    }
    if style.chars().count() > MAX_STYLE_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Style too long (max {} characters)",
            MAX_STYLE_LENGTH
        )));
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ApiError::InvalidInput(
            "Duration must be a positive number of seconds".to_string(),
        ));
    }
    if duration > MAX_DURATION_SECS {
        return Err(ApiError::InvalidInput(format!(
            "Duration too long (max {} seconds)",
            MAX_DURATION_SECS
        )));
    }

    Ok(())
}
