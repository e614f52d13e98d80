use crate::acquisition::buffer::{Row, SampleMatrix};
use crate::acquisition::filter::OnlineFilter;
use crate::acquisition::AcquisitionError;

/// Removes the first `k` rows from the matrix and the filter output.
///
/// `k` may not exceed the filter watermark; larger requests fail and leave
/// both buffers untouched.
pub fn evict(
    matrix: &mut SampleMatrix,
    filter: &mut OnlineFilter,
    k: usize,
) -> Result<(), AcquisitionError> {
    let watermark = filter.watermark().min(matrix.len());
    if k > watermark {
        return Err(AcquisitionError::EvictionBeyondWatermark {
            requested: k,
            watermark,
        });
    }
    matrix.trim_front(k);
    filter.trim_front(k);
    Ok(())
}

/// Evicts enough rows to bring the matrix down to `retain_rows`, limited by
/// the watermark. Evicted rows are returned oldest first so they can be
/// recorded before they are gone.
pub fn evict_excess(
    matrix: &mut SampleMatrix,
    filter: &mut OnlineFilter,
    retain_rows: usize,
) -> Result<Vec<Row>, AcquisitionError> {
    let excess = matrix.len().saturating_sub(retain_rows);
    let k = excess.min(filter.watermark());
    if k == 0 {
        return Ok(Vec::new());
    }
    let rows = matrix.rows().take(k).collect();
    evict(matrix, filter, k)?;
    Ok(rows)
}
