//! Responder that never answers.
//!
//! Lets introspection and rendering run without any classifier. Every
//! classification step sees the empty answer, so fields stay unclassified and
//! no descriptions are generated.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::warn;

use super::{PromptArgs, PromptKind, Responder};

/// No-op responder. Logs a warning on first use.
pub struct NoOpResponder {
    warned: AtomicBool,
}

impl NoOpResponder {
    pub fn new() -> Self {
        Self {
            warned: AtomicBool::new(false),
        }
    }

    fn warn_once(&self) {
        if !self.warned.swap(true, Ordering::SeqCst) {
            warn!(
                "Using no-op responder: fields will not be classified and no \
                 descriptions will be generated."
            );
        }
    }
}

impl Default for NoOpResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for NoOpResponder {
    async fn respond(&self, _kind: PromptKind, _args: &PromptArgs) -> String {
        self.warn_once();
        String::new()
    }

    fn responder_type(&self) -> &'static str {
        "noop"
    }
}
