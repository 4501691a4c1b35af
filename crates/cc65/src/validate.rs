use super::*;

/// Checks that the fragments of `segment` add up to its declared size.
pub(super) fn validate_segment(object: &ObjectFile, segment: &Segment) -> Result<(), ContainerError> {
    let actual: u64 = segment
        .fragments
        .iter()
        .map(|fragment| u64::from(fragment.len()))
        .sum();

    if actual != u64::from(segment.size) {
        let name = object
            .segment_name(segment)
            .map(str::to_string)
            .unwrap_or_else(|_| format!("#{}", segment.name));
        return Err(ContainerError::SegmentSizeMismatch {
            segment: name,
            declared: segment.size,
            actual,
        });
    }

    Ok(())
}
