//! Service sources: classification, cloning and upstream sync

pub mod classifier;
pub mod git;
pub mod sync;

pub use classifier::{classify, resolve, ImageProbe, SourceKind, SourceRef};
pub use git::{is_working_tree, GitCli, Vcs};
pub use sync::{SyncOutcome, Synchronizer};
