pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod identity;
pub mod index;
pub mod interrupt;
pub mod ledger;
pub mod placement;
pub mod progress;
pub mod scanner;
pub mod storage;

pub use classifier::{Classifier, ClassifierStats, ClassifyOptions, TransferMode};
pub use config::AppConfig;
pub use engine::{DedupEngine, DedupOptions, DispositionMode, ProcessStats};
pub use error::Error;
pub use identity::IdentityPolicy;
pub use index::ExistenceIndex;
pub use interrupt::InterruptHandle;
pub use progress::{ProgressReporter, SilentReporter};
