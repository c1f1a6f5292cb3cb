//! One-time choice between the local and remote expression strategies.

use crate::config::StrategyMode;
use crate::strategy::ExpressionStrategy;
use std::sync::Arc;

/// Picks the expression strategy for the life of the process.
///
/// In [`StrategyMode::Local`] the local strategy is built and checked once; if
/// its resources are missing the remote strategy is used instead and local is
/// never consulted again. The local strategy is only constructed in local mode.
pub fn select_expression_strategy<L>(
    mode: StrategyMode,
    local: L,
    remote: Arc<dyn ExpressionStrategy>,
) -> Arc<dyn ExpressionStrategy>
where
    L: FnOnce() -> Arc<dyn ExpressionStrategy>,
{
    match mode {
        StrategyMode::Local => {
            let local = local();
            if local.is_available() {
                tracing::info!("using local model for expression generation");
                local
            } else {
                tracing::warn!(
                    "local model artifacts are unavailable, falling back to remote expression generation"
                );
                remote
            }
        }
        StrategyMode::Remote => {
            tracing::info!("using remote service for expression generation");
            remote
        }
    }
}
