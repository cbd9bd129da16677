// Scripted remote-inference double shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::client::RemoteInference;
use super::reply::{parse_reply, RemoteReply};
use super::request::InferenceRequest;
use crate::error::RemoteServiceError;
use crate::indicators::{IndicatorName, IndicatorSet};
use crate::portfolio::PortfolioState;
use crate::regime::{MarketRegime, RegimeAssessment};
use crate::risk::RiskProfile;
use crate::types::RiskLevel;

/// Replays a fixed list of raw reply contents (or errors), one per call.
pub struct ScriptedRemote {
    script: Mutex<VecDeque<Result<String, RemoteServiceError>>>,
    calls: AtomicUsize,
    hang: bool,
}

impl ScriptedRemote {
    pub fn new(script: Vec<Result<String, RemoteServiceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            hang: false,
        }
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteInference for ScriptedRemote {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, _request: &InferenceRequest) -> Result<RemoteReply, RemoteServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(content)) => parse_reply(&content),
            Some(Err(err)) => Err(err),
            None => Err(RemoteServiceError::Transport("script exhausted".to_string())),
        }
    }
}

pub fn sample_request() -> InferenceRequest {
    let set = IndicatorSet::from_values([(IndicatorName::Rsi, 50.0)], 100.0, Utc::now(), 60);
    let regime = RegimeAssessment {
        regime: MarketRegime::MeanReverting,
        confidence: 0.3,
        hurst: Some(0.5),
        volatility_ratio: None,
        volatility_stability: None,
    };
    InferenceRequest::build(
        "BTC",
        &set,
        &regime,
        &PortfolioState::new(1_000.0),
        &RiskProfile::for_level(RiskLevel::Medium),
    )
}
