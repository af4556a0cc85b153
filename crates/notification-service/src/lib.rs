mod commentary;
mod monitor;
mod templates;

pub use commentary::{
    commentary_from_config, CommentaryConfig, CommentaryError, CommentaryGenerator, CommentaryRequest,
    LlmCommentary, TemplateCommentary,
};
pub use monitor::{spawn_monitor, AlertMonitor, MonitorConfig, MonitorError, MonitorReport, SymbolFailure};
pub use templates::CommentaryTemplate;
