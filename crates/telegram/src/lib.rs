pub mod approval;
pub mod notifier;

pub use approval::{run_approval_bot, ApprovalDeps, CallbackAction};
pub use notifier::TelegramNotifier;
