/// Errors produced by the sealing engine.
///
/// Submission endpoints never surface these to remote callers; they collapse
/// every rejection to `false` and log the reason instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    #[error("seal engine stopped")]
    Stopped,
    #[error("malformed seal: {0}")]
    MalformedSeal(String),
    #[error("turn {turn} out of range for {validators} validators")]
    TurnOutOfRange { turn: u64, validators: usize },
    #[error("no epoch consensus info covers time {time}")]
    EpochNotFound { time: u64 },
    #[error("invalid signature: {signer} in header hash: {header_hash} with sealHash: {seal_hash}")]
    InvalidSignature {
        signer: String,
        seal_hash: String,
        header_hash: String,
    },
    #[error("header time {time} outside slot {slot} window [{window_start}, {window_end})")]
    StaleOrFutureSlot {
        slot: u64,
        time: u64,
        window_start: u64,
        window_end: u64,
    },
    #[error("invalid parent hash: expected {expected}, received {received}")]
    ParentMismatch { expected: String, received: String },
    #[error("invalid block number: expected {expected}, received {received}")]
    NumberMismatch { expected: u64, received: u64 },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("non-positive difficulty")]
    InvalidDifficulty,
    #[error("invalid mix digest")]
    InvalidMixDigest,
    #[error("invalid proof-of-work")]
    InvalidPow,
    #[error("unknown ancestor")]
    UnknownAncestor,
    #[error("no mining work available yet")]
    NoWork,
    #[error("work submitted but none pending")]
    UnknownWork,
    #[error("work submitted is stale")]
    StaleWork,
}

impl From<rlp::DecoderError> for Error {
    fn from(err: rlp::DecoderError) -> Self {
        Error::MalformedSeal(err.to_string())
    }
}
