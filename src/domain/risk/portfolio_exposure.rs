//! Gate 8: portfolio beta-weighted delta. Linear in the underlying
//! per-position beta-weighted deltas (§8 round-trip law:
//! `BWD(P ∪ Q) = BWD(P) + BWD(Q)`), so portfolio aggregation is a plain sum.

use crate::domain::errors::RiskGateError;

/// One position's contribution: its raw delta times its beta vs SPY.
pub fn beta_weighted_delta(position_delta: f64, beta: f64) -> f64 {
    position_delta * beta
}

/// Sums beta-weighted deltas across positions; linear by construction.
pub fn portfolio_beta_weighted_delta(contributions: &[f64]) -> f64 {
    contributions.iter().sum()
}

/// §4.10.8: the *new* net β-weighted Δ after adding the proposal must stay
/// within `max_bw_delta`, and the directional (same-sign) exposure must not
/// exceed 80% of `max_bw_delta`.
pub fn check(current_bwd: f64, proposed_contribution: f64, max_bw_delta: f64) -> Result<(), RiskGateError> {
    let projected = current_bwd + proposed_contribution;
    if projected.abs() > max_bw_delta {
        return Err(RiskGateError::PortfolioExposure {
            projected_bwd: projected,
            max_bwd: max_bw_delta,
        });
    }
    let directional_cap = max_bw_delta * 0.80;
    if projected.abs() > directional_cap && projected.signum() == current_bwd.signum() {
        return Err(RiskGateError::PortfolioExposure {
            projected_bwd: projected,
            max_bwd: directional_cap,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_is_linear() {
        let p = [beta_weighted_delta(10.0, 1.2), beta_weighted_delta(-5.0, 0.9)];
        let q = [beta_weighted_delta(3.0, 1.0)];
        let combined: Vec<f64> = p.iter().chain(q.iter()).copied().collect();
        let bwd_p_union_q = portfolio_beta_weighted_delta(&combined);
        let bwd_p = portfolio_beta_weighted_delta(&p);
        let bwd_q = portfolio_beta_weighted_delta(&q);
        assert!((bwd_p_union_q - (bwd_p + bwd_q)).abs() < 1e-9);
    }

    #[test]
    fn rejects_breach_of_absolute_cap() {
        assert!(check(90.0, 20.0, 100.0).is_err());
    }

    #[test]
    fn rejects_directional_concentration_within_absolute_cap() {
        // 85 is under the 100 absolute cap but over the 80% directional cap.
        assert!(check(60.0, 25.0, 100.0).is_err());
    }

    #[test]
    fn accepts_within_both_caps() {
        assert!(check(10.0, 5.0, 100.0).is_ok());
    }
}
