use crate::capability::Capabilities;

///Errors produced by segio streams.
///
/// Errors from children are passed through unchanged.  The only error a composite interprets is
/// [Error::EndOfStream], which may mean "move on to the next segment" rather than "the composite is exhausted".
#[derive(Debug,thiserror::Error)]
pub enum Error {
    #[error("operation on a closed stream")]
    Closed,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("end of stream")]
    EndOfStream,
    #[error("negative value {0} where a size or count was expected")]
    NegativeValue(i64),
    #[error("stream does not support {0:?}")]
    Unsupported(Capabilities),
    #[error("offloaded operation was dropped before completing")]
    Worker,
    #[error("io error {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

///Rejects negative counts and sizes.
pub(crate) fn non_negative(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::NegativeValue(value))
}

#[cfg(feature="block_party")]
impl From<block_party::Canceled> for Error {
    fn from(_: block_party::Canceled) -> Self {
        Error::Worker
    }
}
