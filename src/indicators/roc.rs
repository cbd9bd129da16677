// =============================================================================
// Rate of Change (ROC)
// =============================================================================
//
//   ROC = (close - close_{t-n}) / close_{t-n} * 100
//
// Needs `period + 1` closes.

pub const ROC_PERIOD: usize = 10;

/// Latest ROC in percent; `None` when too short or the reference close is 0.
pub fn latest_roc(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }
    let last = closes[closes.len() - 1];
    let reference = closes[closes.len() - 1 - period];
    if reference == 0.0 {
        return None;
    }
    let roc = (last - reference) / reference * 100.0;
    roc.is_finite().then_some(roc)
}
