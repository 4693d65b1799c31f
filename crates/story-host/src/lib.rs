pub mod adapters;
pub mod autosave;
pub mod browser;
pub mod config;
pub mod daemon;
pub mod error;
pub mod import;
pub mod masks;
pub mod protocol;
pub mod publish;
pub mod session;

pub use adapters::fs::LocalBackend;
#[cfg(feature = "adapter-http")]
pub use adapters::http::HttpBackend;
pub use adapters::registry::Collaborators;
pub use autosave::{AutosaveScheduler, Evaluation, Phase};
pub use config::{HostConfig, HttpAdapterConfig};
pub use daemon::{ControlMsg, SaveOutcome, SessionDaemon, SessionHandle, SessionSnapshot};
pub use error::{HostError, HostResult};
pub use import::{ImportOutcome, import};
pub use session::{Change, Edit, Session, ViewEdit, ViewState, ViewerProjection};
