use crate::float_types::Real;
use crate::signal::CubeFace;
use thiserror::Error;

/// All the ways an input to the pipeline can be rejected.
///
/// These are only raised at entry points (configuration, mesh and signal construction).
/// Conditions met while a run is in flight (rays that miss the cube, faces with too few
/// defects, superseded generations, empty label buffers) are absorbed and logged instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The global seed must be finite and in `(0, 1]`
    #[error("seed must be in (0, 1], got {0}")]
    InvalidSeed(Real),
    /// At least one displacement iteration is required
    #[error("iteration count must be at least 1, got {0}")]
    InvalidIterations(u32),
    /// Signal resolution below the smallest noise cell
    #[error("resolution must be in 4..=4096, got {0}")]
    InvalidResolution(u32),
    /// Some other configuration value is out of range, or the config failed to parse
    #[error("invalid configuration: {0}")]
    Config(String),
    /// `use_generated_signal` is off and no imported signal was supplied
    #[error("no cube signal supplied while generated signals are disabled")]
    MissingSignal,
    /// A cube signal must have exactly six faces
    #[error("a cube signal needs exactly 6 faces, got {0}")]
    FaceCount(usize),
    /// Every face must share the size of the first one
    #[error("face {face:?} is {found}px, expected {expected}px")]
    FaceSize {
        face: CubeFace,
        expected: usize,
        found: usize,
    },
    /// Pixel buffer length does not describe a square texture
    #[error("texture buffer of {0} pixels is not square")]
    NonSquareFace(usize),
    /// Named face import could not place a texture on the cube
    #[error("could not match \"{0}\" to a cube face")]
    UnknownFace(String),
    /// A triangle refers to a vertex that does not exist
    #[error("triangle index {index} is out of range (vertex count {len})")]
    IndexOutOfRange { index: usize, len: usize },
    /// Flat index buffer whose length is not a multiple of three
    #[error("index buffer length {0} is not a multiple of 3")]
    RaggedIndices(usize),
    /// A mesh without vertices or triangles cannot be displaced
    #[error("mesh has no vertices or triangles")]
    EmptyMesh,
    /// All vertices coincide, so there is no shell to displace
    #[error("mesh has zero extent")]
    DegenerateMesh,
}
