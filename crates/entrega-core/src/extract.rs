use crate::error::BoxError;
use crate::message::Message;

/// A named pre-handler inspection step, run once per delivery in
/// registration order.
///
/// Extractors see the full message and may write derived state into its
/// extension map. Acknowledgment stays with the handler and the dispatcher:
/// the synchronous signature cannot await the gate. The first failing
/// extractor aborts the rest of the pipeline; effects of the ones that
/// already ran remain visible.
pub trait Extractor: Send + Sync {
    /// Stable name, used in logs and in `ExtractError`.
    fn name(&self) -> &str;

    fn extract(&self, message: &mut Message) -> Result<(), BoxError>;
}
