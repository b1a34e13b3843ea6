//! 🫁欢迎光临🫁
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::{
    ComponentKind, MatrixCollection, ReconstructedVolume4D, SliceKey, SliceMatrix, Volume4D,
    VolumeError, VolumeResult, VolumeShape,
};

pub use crate::consts::{DEFAULT_LAMBDA, DEFAULT_TOLERANCE, DEFAULT_VOLUME_MAX_ITERS};

pub use crate::reshape::reshape;
pub use crate::solver::{Decomposition, LsSolver, SolverError};
pub use crate::decompose::{decompose_volume, DecomposeError, VolumeDecomposer};
pub use crate::persist::{export, import, to_volume4d, PersistError};
pub use crate::components::{principal_components, Components};
