//! Final sample collection assembly

use crate::sample::{Metadata, Sample};

/// Annotate measured samples with store metadata and append telemetry
///
/// Store keys are only added where a sample does not already carry them.
/// Auxiliary samples follow the measured ones in their production order;
/// without them the result is the annotated raw samples, unchanged in
/// order.
pub fn aggregate_samples(
    raw: Vec<Sample>,
    store_metadata: &Metadata,
    auxiliary: Option<Vec<Sample>>,
) -> Vec<Sample> {
    let mut samples = raw;
    for sample in &mut samples {
        sample.merge_metadata(store_metadata);
    }

    if let Some(auxiliary) = auxiliary {
        tracing::debug!(count = auxiliary.len(), "Appending auxiliary samples");
        samples.extend(auxiliary);
    }
    samples
}
