/// Errors surfaced by the public operations.
///
/// Probe failures never reach the caller; a probe that cannot read its OS
/// surface simply reports no evidence. The only condition that escapes is a
/// malformed flag argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid flag argument: {0}")]
    InvalidArgument(&'static str),
}
