//! GitHub webhook intake.
//!
//! - [`signature`]: HMAC-SHA256 delivery verification
//! - [`parser`]: payload parsing into [`WebhookEvent`]
//! - [`command`]: `/easycla` detection in comments
//! - [`dispatch`]: routing events to auto-enable, disable and audit effects

pub mod command;
pub mod dispatch;
pub mod events;
pub mod parser;
pub mod signature;

pub use command::{RECHECK_COMMAND, contains_recheck_command};
pub use dispatch::{DispatchReport, WebhookDispatcher};
pub use events::{
    CommentAction, InstallationAction, InstallationEvent, InstallationRepositoriesEvent,
    IssueCommentEvent, RepositoriesAction, RepositoryAction, RepositoryEvent, RepositoryRef,
    WebhookEvent,
};
pub use parser::{ParseError, parse_webhook};
pub use signature::{parse_signature_header, sign_payload, verify_signature};
