use defmt::Format;

/// Error taxonomy shared by every component in the pipeline.
///
/// `Timeout` and `HardwareFailure` are recoverable and handled by the
/// caller on the next cycle, `InvalidArgument` is a caller bug, and `Fatal`
/// is only ever returned from startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format, thiserror::Error)]
pub enum CoreError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("timed out acquiring a shared resource")]
    Timeout,
    #[error("hardware operation failed")]
    HardwareFailure,
    #[error("network publish failed")]
    TransientPublishFailure,
    #[error("fatal startup failure")]
    Fatal,
    /// Relay-specific refinement of the taxonomy: a `set_state` transition
    /// was blocked by the cooldown guard. Not one of the generic pipeline
    /// errors above, but the relay controller's `set_state` contract calls
    /// for a distinct value rather than overloading `Timeout`.
    #[error("relay transition blocked by cooldown")]
    InvalidState,
}

pub type Result<T> = core::result::Result<T, CoreError>;
