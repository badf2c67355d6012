use thiserror::Error;

/// Errors surfaced by a bake.
///
/// Setup failures (`Configuration`, `Unsupported`) abort before any scene
/// mutation. `Data` and `Cancelled` can occur mid-bake; the driver rolls
/// back every mutation it performed before returning them. `Invariant` is
/// only ever logged and skipped at per-particle granularity; it appears
/// as an error value where a caller asks for something that cannot exist
/// (e.g. duplicating an empty template slot).
#[derive(Error, Debug)]
pub enum BakeError {
    /// Invalid or missing instancing relationship, animated template in an
    /// animated bake, or inconsistent session options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The instancing relationship has a shape the bake cannot represent,
    /// e.g. a duplicate whose root is not a transform.
    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    /// A declared per-particle attribute could not be read.
    #[error("particle data error: {0}")]
    Data(String),

    /// The host requested an abort. All scene mutations performed so far
    /// have been rolled back by the time this is returned.
    #[error("bake cancelled")]
    Cancelled,

    /// Internal bookkeeping disagreed with the scene. Per-particle cases
    /// are logged and skipped rather than surfaced.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, BakeError>;
