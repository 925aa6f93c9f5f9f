pub mod error;
pub mod features;
pub mod history;
pub mod model;
pub mod oracle;
mod parallel;
pub mod prox;
pub mod sampler;
pub mod shared;
pub mod svrg;

pub use error::SolverError;
pub use features::Features;
pub use history::History;
pub use model::{Family, Glm, Model};
pub use prox::{Prox, ProxL1, ProxL2Sq, ProxZero};
pub use sampler::RandType;
pub use svrg::{SolveStatus, Svrg, SvrgConfig, VarianceReduction};
