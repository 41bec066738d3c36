//! Core measurement traits.

use crate::measurement::{MeasurementOptions, ParseOutput, ProgressBuffer, ProgressMode};

/// Turns the accumulated raw output of a measurement tool into a record.
///
/// Called with the full text seen so far, so it must accept incomplete
/// output. When no hostname or address can be resolved yet, the respective
/// fields are `None`.
pub trait OutputParser: Send + Sync {
    fn parse(&self, raw_output: &str) -> ParseOutput;
}

/// One measurement strategy.
///
/// # Error Handling Philosophy
///
/// A prober never fails: target resolution errors, tool failures, timeouts
/// and privacy violations are all observations and end up in the returned
/// [`ParseOutput`] with `status: failed`. Only option validation, which
/// happens before a prober is selected, can reject a run.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// How this strategy's partial state is forwarded.
    fn progress_mode(&self) -> ProgressMode;

    /// Run the measurement, pushing partial state into `progress` when
    /// `options.in_progress_updates` is set.
    ///
    /// The returned record is the terminal result before normalization.
    async fn probe(
        &self,
        options: &MeasurementOptions,
        progress: &mut ProgressBuffer<'_>,
    ) -> ParseOutput;
}
