use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, InvariantViolation};
use crate::types::{ContractId, PlanId};

/// Relative slack allowed when checking a reimbursement against `[0, claim]`.
const REIMBURSEMENT_TOLERANCE: f64 = 1e-9;

/// The upper cap of a plan. Zero in the raw plan definition means "unset".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Cap {
    Uncapped,
    /// Maximum cumulative out-of-pocket (deductible + co-payments).
    StopLoss(f64),
    /// Maximum cumulative reimbursement.
    StopClaim(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Breakpoints {
    pub bp1: f64,
    /// `f64::INFINITY` for an uncapped plan.
    pub bp2: f64,
}

/// Where a claim interval `[claims_ytd, claims_ytd + claim]` falls relative
/// to `[bp1, bp2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Regime {
    BelowDeductible,
    CrossesDeductible,
    CrossesBothBreakpoints,
    WithinCoinsurance,
    CrossesCap,
    BeyondCap,
}

/// Result of the budget inversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ClaimCeiling {
    Bounded(f64),
    /// The insured's out-of-pocket is capped below the allowance: any claim
    /// is affordable.
    Unbounded,
}

impl ClaimCeiling {
    /// Cap a bill at this ceiling.
    pub fn cap(self, amount: f64) -> f64 {
        match self {
            ClaimCeiling::Bounded(max) => amount.min(max),
            ClaimCeiling::Unbounded => amount,
        }
    }

    pub fn is_unbounded(self) -> bool {
        matches!(self, ClaimCeiling::Unbounded)
    }
}

/// A plan's split of cumulative claims `Y` between insurer and insured.
///
/// Piecewise linear with two breakpoints: below `bp1` (the deductible) the
/// insured pays everything, between `bp1` and `bp2` the insured pays the
/// co-payment rate, and beyond `bp2` a stop-loss plan pays everything while a
/// stop-claim plan pays nothing. [`CostSharing::max_affordable_claim`] inverts
/// [`CostSharing::reimbursement`] on the out-of-pocket axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostSharing {
    pub deductible: f64,
    pub copayment_rate: f64,
    pub cap: Cap,
}

/// Breakpoints straight from raw plan parameters (`0` = cap unset).
pub fn breakpoints(
    plan: PlanId,
    deductible: f64,
    copayment_rate: f64,
    stop_loss: f64,
    stop_claim: f64,
) -> Result<Breakpoints, ConfigError> {
    CostSharing::new(plan, deductible, copayment_rate, stop_loss, stop_claim)
        .map(|terms| terms.breakpoints())
}

fn check_amount(plan: PlanId, field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeAmount { plan, field, value })
    }
}

impl CostSharing {
    /// Validate raw plan parameters. `stop_loss` and `stop_claim` use `0` for
    /// "not set"; setting both is rejected rather than resolved.
    pub fn new(
        plan: PlanId,
        deductible: f64,
        copayment_rate: f64,
        stop_loss: f64,
        stop_claim: f64,
    ) -> Result<Self, ConfigError> {
        check_amount(plan, "deductible", deductible)?;
        check_amount(plan, "stop_loss", stop_loss)?;
        check_amount(plan, "stop_claim", stop_claim)?;
        if !(0.0..1.0).contains(&copayment_rate) {
            return Err(ConfigError::CopaymentOutOfRange { plan, rate: copayment_rate });
        }
        if stop_loss != 0.0 && stop_claim != 0.0 {
            return Err(ConfigError::ConflictingCaps { plan, stop_loss, stop_claim });
        }
        if stop_loss != 0.0 && stop_loss < deductible {
            return Err(ConfigError::StopLossBelowDeductible { plan, stop_loss, deductible });
        }

        let cap = if stop_loss != 0.0 {
            Cap::StopLoss(stop_loss)
        } else if stop_claim != 0.0 {
            Cap::StopClaim(stop_claim)
        } else {
            Cap::Uncapped
        };
        Ok(CostSharing { deductible, copayment_rate, cap })
    }

    pub fn is_stop_loss(&self) -> bool {
        matches!(self.cap, Cap::StopLoss(_))
    }

    pub fn breakpoints(&self) -> Breakpoints {
        let d = self.deductible;
        let c = self.copayment_rate;
        let bp2 = match self.cap {
            Cap::StopLoss(l) if l == d => d,
            // Nothing is co-paid, so the out-of-pocket never reaches the cap.
            Cap::StopLoss(_) if c == 0.0 => f64::INFINITY,
            Cap::StopLoss(l) => d + (l - d) / c,
            Cap::StopClaim(claim_cap) => d + claim_cap / (1.0 - c),
            Cap::Uncapped => f64::INFINITY,
        };
        Breakpoints { bp1: d, bp2 }
    }

    pub fn regime(&self, claims_ytd: f64, claim: f64) -> Regime {
        let Breakpoints { bp1, bp2 } = self.breakpoints();
        let end = claims_ytd + claim;
        if claims_ytd < bp1 {
            if end <= bp1 {
                Regime::BelowDeductible
            } else if end < bp2 {
                Regime::CrossesDeductible
            } else {
                Regime::CrossesBothBreakpoints
            }
        } else if claims_ytd < bp2 {
            if end <= bp2 { Regime::WithinCoinsurance } else { Regime::CrossesCap }
        } else {
            Regime::BeyondCap
        }
    }

    /// Reimbursement owed for `claim` when `claims_ytd` has already been
    /// claimed this year. Pure; the caller decides whether to book it.
    pub fn reimbursement(&self, claims_ytd: f64, claim: f64) -> Result<f64, InvariantViolation> {
        self.reimbursement_for(None, claims_ytd, claim)
    }

    pub(crate) fn reimbursement_for(
        &self,
        contract: Option<ContractId>,
        claims_ytd: f64,
        claim: f64,
    ) -> Result<f64, InvariantViolation> {
        if !claim.is_finite() || claim < 0.0 {
            return Err(InvariantViolation::InvalidClaim { contract, claim });
        }

        let Breakpoints { bp1, bp2 } = self.breakpoints();
        let c = self.copayment_rate;
        let end = claims_ytd + claim;
        let excess = |from: f64| if self.is_stop_loss() { end - from } else { 0.0 };

        let reimbursement = match self.regime(claims_ytd, claim) {
            Regime::BelowDeductible => 0.0,
            Regime::CrossesDeductible => (1.0 - c) * (claim - (bp1 - claims_ytd)),
            Regime::CrossesBothBreakpoints => (1.0 - c) * (bp2 - bp1) + excess(bp2),
            Regime::WithinCoinsurance => claim * (1.0 - c),
            Regime::CrossesCap => (bp2 - claims_ytd) * (1.0 - c) + excess(bp2),
            // Stop-loss: the insured's exposure is exhausted. Stop-claim: the
            // insurer's is.
            Regime::BeyondCap => {
                if self.is_stop_loss() {
                    claim
                } else {
                    0.0
                }
            }
        };

        let slack = REIMBURSEMENT_TOLERANCE * claim.max(1.0);
        if reimbursement.is_nan() || reimbursement < -slack || reimbursement > claim + slack {
            return Err(InvariantViolation::InvalidReimbursement {
                contract,
                claims_ytd,
                claim,
                reimbursement,
            });
        }
        Ok(reimbursement)
    }

    /// Cumulative out-of-pocket after `cumulative_claims` have been claimed.
    pub fn out_of_pocket_at(&self, cumulative_claims: f64) -> f64 {
        let Breakpoints { bp1, bp2 } = self.breakpoints();
        let c = self.copayment_rate;
        if cumulative_claims <= bp1 {
            cumulative_claims
        } else if cumulative_claims <= bp2 {
            bp1 + c * (cumulative_claims - bp1)
        } else {
            let at_bp2 = bp1 + c * (bp2 - bp1);
            match self.cap {
                Cap::StopClaim(_) => at_bp2 + (cumulative_claims - bp2),
                Cap::StopLoss(_) | Cap::Uncapped => at_bp2,
            }
        }
    }

    /// Out-of-pocket level from which the curve stays flat forever, if any.
    fn out_of_pocket_plateau(&self) -> Option<f64> {
        match self.cap {
            Cap::StopLoss(_) if self.copayment_rate == 0.0 => Some(self.deductible),
            Cap::StopLoss(l) => Some(l),
            Cap::Uncapped if self.copayment_rate == 0.0 => Some(self.deductible),
            Cap::Uncapped | Cap::StopClaim(_) => None,
        }
    }

    /// Largest additional claim the insured can incur, starting at
    /// `claims_ytd`, without paying more than `allowance` out of pocket.
    pub fn max_affordable_claim(&self, claims_ytd: f64, allowance: f64) -> ClaimCeiling {
        let allowance = allowance.max(0.0);
        let Breakpoints { bp1, bp2 } = self.breakpoints();
        let c = self.copayment_rate;
        let target = self.out_of_pocket_at(claims_ytd) + allowance;

        if self.out_of_pocket_plateau().is_some_and(|plateau| target >= plateau) {
            return ClaimCeiling::Unbounded;
        }

        let cumulative = if target < bp1 {
            target
        } else {
            let oop_at_bp2 =
                if bp2.is_infinite() { f64::INFINITY } else { bp1 + c * (bp2 - bp1) };
            if target < oop_at_bp2 {
                bp1 + (target - bp1) / c
            } else {
                match self.cap {
                    Cap::StopClaim(_) => bp2 + (target - oop_at_bp2),
                    // Covered by the plateau check above.
                    Cap::StopLoss(_) | Cap::Uncapped => return ClaimCeiling::Unbounded,
                }
            }
        };

        ClaimCeiling::Bounded((cumulative - claims_ytd).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn stop_loss_plan() -> CostSharing {
        // bp2 = 500 + (2000 - 500) / 0.2 = 8000
        CostSharing::new(PlanId(1), 500.0, 0.2, 2000.0, 0.0).unwrap()
    }

    fn stop_claim_plan() -> CostSharing {
        // bp2 = 500 + 6000 / 0.8 = 8000
        CostSharing::new(PlanId(2), 500.0, 0.2, 0.0, 6000.0).unwrap()
    }

    fn uncapped_plan() -> CostSharing {
        CostSharing::new(PlanId(3), 500.0, 0.2, 0.0, 0.0).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-6 * (1.0 + a.abs().max(b.abs()))
    }

    // ── Breakpoints ───────────────────────────────────────────────────────────

    #[test]
    fn stop_loss_breakpoints() {
        let bp = stop_loss_plan().breakpoints();
        assert_eq!(bp.bp1, 500.0);
        assert!(close(bp.bp2, 8000.0), "bp2={}", bp.bp2);
    }

    #[test]
    fn stop_claim_breakpoints() {
        let bp = stop_claim_plan().breakpoints();
        assert!(close(bp.bp2, 8000.0), "bp2={}", bp.bp2);
    }

    #[test]
    fn uncapped_bp2_exceeds_any_claim() {
        let bp = uncapped_plan().breakpoints();
        assert!(bp.bp2 > 1e300, "uncapped bp2 must compare above any realistic claim");
    }

    #[test]
    fn stop_loss_equal_to_deductible_collapses_breakpoints() {
        let terms = CostSharing::new(PlanId(1), 300.0, 0.1, 300.0, 0.0).unwrap();
        let bp = terms.breakpoints();
        assert_eq!(bp.bp1, bp.bp2);
    }

    #[test]
    fn free_function_matches_method() {
        let bp = breakpoints(PlanId(9), 500.0, 0.2, 2000.0, 0.0).unwrap();
        assert_eq!(bp, stop_loss_plan().breakpoints());
    }

    // ── Configuration rejection ───────────────────────────────────────────────

    #[test]
    fn both_caps_rejected() {
        let err = CostSharing::new(PlanId(4), 500.0, 0.2, 2000.0, 6000.0).unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingCaps { plan: PlanId(4), .. }));
    }

    #[test]
    fn stop_loss_below_deductible_rejected() {
        let err = CostSharing::new(PlanId(5), 1000.0, 0.1, 500.0, 0.0).unwrap_err();
        assert_eq!(
            err,
            ConfigError::StopLossBelowDeductible {
                plan: PlanId(5),
                stop_loss: 500.0,
                deductible: 1000.0
            }
        );
    }

    #[test]
    fn copayment_rate_must_be_below_one() {
        assert!(matches!(
            CostSharing::new(PlanId(6), 0.0, 1.0, 0.0, 0.0),
            Err(ConfigError::CopaymentOutOfRange { .. })
        ));
        assert!(matches!(
            CostSharing::new(PlanId(6), 0.0, -0.1, 0.0, 0.0),
            Err(ConfigError::CopaymentOutOfRange { .. })
        ));
    }

    #[test]
    fn negative_deductible_rejected() {
        assert!(matches!(
            CostSharing::new(PlanId(7), -1.0, 0.1, 0.0, 0.0),
            Err(ConfigError::NegativeAmount { field: "deductible", .. })
        ));
    }

    // ── Regimes ───────────────────────────────────────────────────────────────

    #[test]
    fn regime_1_below_deductible_pays_nothing() {
        let t = stop_loss_plan();
        assert_eq!(t.regime(100.0, 400.0), Regime::BelowDeductible);
        assert_eq!(t.reimbursement(100.0, 400.0).unwrap(), 0.0);
    }

    #[test]
    fn regime_2_crossing_deductible() {
        let t = stop_loss_plan();
        assert_eq!(t.regime(300.0, 700.0), Regime::CrossesDeductible);
        // 500 above the deductible at 80%.
        assert!(close(t.reimbursement(300.0, 700.0).unwrap(), 400.0));
    }

    #[test]
    fn regime_3_stop_loss_worked_example() {
        let t = stop_loss_plan();
        assert_eq!(t.regime(0.0, 9000.0), Regime::CrossesBothBreakpoints);
        let r = t.reimbursement(0.0, 9000.0).unwrap();
        assert!(close(r, 7000.0), "expected (8000-500)*0.8 + 1000 = 7000, got {r}");
    }

    #[test]
    fn regime_3_stop_claim_pays_no_excess() {
        let t = stop_claim_plan();
        let r = t.reimbursement(0.0, 9000.0).unwrap();
        assert!(close(r, 6000.0), "stop-claim caps reimbursement at 6000, got {r}");
    }

    #[test]
    fn regime_4_worked_example() {
        let t = stop_loss_plan();
        assert_eq!(t.regime(600.0, 300.0), Regime::WithinCoinsurance);
        let r = t.reimbursement(600.0, 300.0).unwrap();
        assert!(close(r, 240.0), "expected 300*0.8 = 240, got {r}");
    }

    #[test]
    fn regime_5_crossing_the_cap() {
        let sl = stop_loss_plan();
        assert_eq!(sl.regime(7000.0, 2000.0), Regime::CrossesCap);
        // 1000 at 80% + 1000 excess in full.
        assert!(close(sl.reimbursement(7000.0, 2000.0).unwrap(), 1800.0));

        let sc = stop_claim_plan();
        assert!(close(sc.reimbursement(7000.0, 2000.0).unwrap(), 800.0));
    }

    #[test]
    fn regime_6_asymmetry_between_caps() {
        assert_eq!(stop_loss_plan().regime(8000.0, 100.0), Regime::BeyondCap);
        assert_eq!(stop_loss_plan().reimbursement(8000.0, 100.0).unwrap(), 100.0);
        assert_eq!(stop_claim_plan().reimbursement(8000.0, 100.0).unwrap(), 0.0);
    }

    #[test]
    fn zero_deductible_starts_in_coinsurance() {
        let t = CostSharing::new(PlanId(1), 0.0, 0.1, 0.0, 0.0).unwrap();
        assert_eq!(t.regime(0.0, 100.0), Regime::WithinCoinsurance);
        assert!(close(t.reimbursement(0.0, 100.0).unwrap(), 90.0));
    }

    #[test]
    fn stop_loss_at_deductible_pays_everything_above_it() {
        let t = CostSharing::new(PlanId(1), 300.0, 0.1, 300.0, 0.0).unwrap();
        assert!(close(t.reimbursement(0.0, 1000.0).unwrap(), 700.0));
    }

    #[test]
    fn negative_claim_is_an_invariant_violation() {
        let err = stop_loss_plan().reimbursement(0.0, -1.0).unwrap_err();
        assert!(matches!(err, InvariantViolation::InvalidClaim { .. }));
        assert!(stop_loss_plan().reimbursement(0.0, f64::NAN).is_err());
    }

    #[test]
    fn zero_claim_reimburses_zero_everywhere() {
        for y in [0.0, 250.0, 500.0, 4000.0, 8000.0, 20_000.0] {
            assert_eq!(stop_loss_plan().reimbursement(y, 0.0).unwrap(), 0.0, "y={y}");
            assert_eq!(stop_claim_plan().reimbursement(y, 0.0).unwrap(), 0.0, "y={y}");
        }
    }

    // ── Budget inversion ──────────────────────────────────────────────────────

    #[test]
    fn budget_below_deductible_is_the_allowance() {
        assert_eq!(stop_loss_plan().max_affordable_claim(0.0, 300.0), ClaimCeiling::Bounded(300.0));
    }

    #[test]
    fn budget_within_coinsurance_scales_by_rate() {
        let ceiling = stop_loss_plan().max_affordable_claim(1000.0, 100.0);
        match ceiling {
            ClaimCeiling::Bounded(v) => assert!(close(v, 500.0), "100 / 0.2 = 500, got {v}"),
            ClaimCeiling::Unbounded => panic!("expected bounded ceiling"),
        }
    }

    #[test]
    fn stop_loss_reached_is_unbounded() {
        let t = stop_loss_plan();
        assert!(t.max_affordable_claim(0.0, 2000.0).is_unbounded());
        assert!(t.max_affordable_claim(9000.0, 0.0).is_unbounded());
        assert!(!t.max_affordable_claim(0.0, 1999.0).is_unbounded());
    }

    #[test]
    fn stop_claim_is_never_unbounded() {
        let t = stop_claim_plan();
        // OOP at bp2 = 500 + 0.2 * 7500 = 2000; 1000 more is paid in full.
        match t.max_affordable_claim(0.0, 3000.0) {
            ClaimCeiling::Bounded(v) => assert!(close(v, 9000.0), "got {v}"),
            ClaimCeiling::Unbounded => panic!("stop-claim plans never become unbounded"),
        }
        assert_eq!(t.max_affordable_claim(10_000.0, 50.0), ClaimCeiling::Bounded(50.0));
    }

    #[test]
    fn ceiling_caps_a_bill() {
        assert_eq!(ClaimCeiling::Bounded(80.0).cap(100.0), 80.0);
        assert_eq!(ClaimCeiling::Bounded(80.0).cap(50.0), 50.0);
        assert_eq!(ClaimCeiling::Unbounded.cap(1e9), 1e9);
    }

    // ── Properties ────────────────────────────────────────────────────────────

    fn terms_strategy() -> impl Strategy<Value = CostSharing> {
        (0.0..5_000.0f64, 0.01..0.99f64, 0u8..3, 0.0..10_000.0f64).prop_map(
            |(d, c, kind, extra)| match kind {
                0 => CostSharing::new(PlanId(1), d, c, d + extra, 0.0).unwrap(),
                1 => CostSharing::new(PlanId(1), d, c, 0.0, extra + 1.0).unwrap(),
                _ => CostSharing::new(PlanId(1), d, c, 0.0, 0.0).unwrap(),
            },
        )
    }

    proptest! {
        #[test]
        fn sequential_claims_are_additive(
            t in terms_strategy(),
            a in 0.0..50_000.0f64,
            b in 0.0..50_000.0f64,
        ) {
            let first = t.reimbursement(0.0, a).unwrap();
            let second = t.reimbursement(a, b).unwrap();
            let combined = t.reimbursement(0.0, a + b).unwrap();
            prop_assert!(
                (first + second - combined).abs() <= 1e-6 * (1.0 + a + b),
                "{first} + {second} != {combined}"
            );
        }

        #[test]
        fn reimbursement_is_bounded_and_monotone(
            t in terms_strategy(),
            y in 0.0..30_000.0f64,
            a in 0.0..30_000.0f64,
            extra in 0.0..5_000.0f64,
        ) {
            let r = t.reimbursement(y, a).unwrap();
            let slack = 1e-9 * (1.0 + a);
            prop_assert!(r >= -slack && r <= a + slack, "r={r} outside [0, {a}]");
            let r_more = t.reimbursement(y, a + extra).unwrap();
            prop_assert!(r_more + 1e-6 * (1.0 + a + extra) >= r, "{r_more} < {r}");
        }

        #[test]
        fn budget_inverts_out_of_pocket(t in terms_strategy(), claim in 0.0..40_000.0f64) {
            let bp = t.breakpoints();
            // The inverse is unique only where the out-of-pocket curve rises.
            prop_assume!(!(t.is_stop_loss() && claim >= bp.bp2));
            let allowance = claim - t.reimbursement(0.0, claim).unwrap();
            match t.max_affordable_claim(0.0, allowance) {
                ClaimCeiling::Bounded(v) => prop_assert!(
                    (v - claim).abs() <= 1e-6 * (1.0 + claim),
                    "ceiling {v} != claim {claim}"
                ),
                ClaimCeiling::Unbounded => prop_assert!(false, "unexpected unbounded ceiling"),
            }
        }

        #[test]
        fn claims_within_ceiling_stay_within_allowance(
            t in terms_strategy(),
            y in 0.0..20_000.0f64,
            allowance in 0.0..5_000.0f64,
        ) {
            if let ClaimCeiling::Bounded(ceiling) = t.max_affordable_claim(y, allowance) {
                let oop = ceiling - t.reimbursement(y, ceiling).unwrap();
                prop_assert!(oop <= allowance + 1e-6 * (1.0 + ceiling), "oop {oop} > {allowance}");
            }
        }
    }
}
