use thiserror::Error;

/// Configuration errors raised at construction time. None of these are
/// recoverable: a policy is either built with a valid geometry or not at
/// all. Runtime misses (an unmapped address in the PLC) are in-band values,
/// not errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("# of sets must be non-zero and a power of 2")]
    SetsNotPowerOfTwo,

    #[error("associativity must be greater than zero")]
    ZeroAssociativity,

    #[error("the number of sets must be greater than 2")]
    TooFewSets,

    #[error("the size of PLC must be larger than 0")]
    ZeroPlcSize,

    #[error("unsupported number of bits for the scattering functions")]
    ScatterWidthOverflow,

    #[error("entry size must be a power of 2")]
    EntrySizeNotPowerOfTwo,

    #[error("# of sectors must be non-zero and divide the number of sets")]
    InvalidSectorCount,
}

/// Type alias for Result with ConfigError
pub type ConfigResult<T> = Result<T, ConfigError>;
