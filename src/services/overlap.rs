use crate::errors::AppError;

/// Half-open interval intersection test. `[a_start, a_end)` and
/// `[b_start, b_end)` overlap when each starts before the other ends, so
/// ranges that merely touch at a boundary do not conflict.
///
/// Every overlap decision in the crate (booking conflicts, shift conflicts,
/// slot generation) goes through this one function.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> Result<bool, AppError> {
    if a_end <= a_start || b_end <= b_start {
        return Err(AppError::Validation(
            "range end must be after range start".to_string(),
        ));
    }
    Ok(a_start < b_end && b_start < a_end)
}
