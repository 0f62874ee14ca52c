pub mod digest;
pub mod error;
pub mod reconcile;
mod workdir;

pub use crate::digest::{file_md5, verify};
pub use crate::reconcile::reconcile;
pub use crate::workdir::{WorkingDirectory, WorkingDirectoryGuard};
