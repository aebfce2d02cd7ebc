pub mod cmi;
pub mod dti;

pub use cmi::CmiFile;
pub use dti::Dti;
