// =============================================================================
// Remote stage — ask the inference collaborator, then risk-check its answer
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::stage::{DecisionStage, EvaluationContext, StageOutcome};
use crate::error::RemoteServiceError;
use crate::remote::{InferenceRequest, RemoteInvoker};
use crate::types::Provenance;

pub struct RemoteStage {
    invoker: Option<Arc<RemoteInvoker>>,
}

impl RemoteStage {
    pub fn new(invoker: Option<Arc<RemoteInvoker>>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl DecisionStage for RemoteStage {
    fn provenance(&self) -> Provenance {
        Provenance::Remote
    }

    async fn attempt(&self, ctx: &EvaluationContext<'_>) -> StageOutcome {
        let Some(invoker) = &self.invoker else {
            debug!(asset = ctx.asset, "remote inference not configured");
            return StageOutcome::NeedsFallback(RemoteServiceError::Disabled.to_string());
        };

        let portfolio = ctx.book.snapshot();
        let request = InferenceRequest::build(ctx.asset, ctx.indicators, ctx.regime, &portfolio, ctx.profile);

        match invoker.invoke(&request, ctx.token).await {
            Ok(reply) => {
                let reasoning = if reply.reasoning.is_empty() {
                    format!("remote: {} (no reasoning given)", reply.action)
                } else {
                    format!("remote: {}", reply.reasoning)
                };
                StageOutcome::Ready(ctx.finalize(reply.action, reply.confidence, &[], Provenance::Remote, reasoning))
            }
            Err(err) => {
                warn!(asset = ctx.asset, error = %err, "remote inference failed, falling back to quant");
                StageOutcome::NeedsFallback(err.to_string())
            }
        }
    }
}
