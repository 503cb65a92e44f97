//! Transformation scores, flux change labels, and the robust score combination
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Score given to an invalid knockout (infeasible, failed, or collapsed solution)
pub const INVALID_SCORE: f64 = f64::NEG_INFINITY;
/// Scores below the negative of this value are treated as invalid
pub const SCORE_FLOOR_THRESHOLD: f64 = 1e30;
/// Reference fluxes with a magnitude below this are considered to carry no flux
pub const ZERO_FLUX_THRESHOLD: f64 = 1e-6;
/// Flux vectors with a norm below this are collapsed solutions
pub const COLLAPSE_NORM_THRESHOLD: f64 = 1e-6;

/// Desired direction of change for a reaction's flux
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FluxChange {
    /// Flux should increase (label `1`)
    Forward,
    /// Flux should decrease (label `-1`)
    Backward,
    /// Flux should stay as it is (label `0`)
    Unchanged,
}

impl FluxChange {
    /// Numeric label of the change, `1`, `-1` or `0`
    pub fn sign(self) -> f64 {
        match self {
            FluxChange::Forward => 1.,
            FluxChange::Backward => -1.,
            FluxChange::Unchanged => 0.,
        }
    }

    /// The change in the opposite direction (unchanged stays unchanged)
    pub fn reversed(self) -> Self {
        match self {
            FluxChange::Forward => FluxChange::Backward,
            FluxChange::Backward => FluxChange::Forward,
            FluxChange::Unchanged => FluxChange::Unchanged,
        }
    }

    /// Whether a change is desired at all
    pub fn is_changed(self) -> bool {
        self != FluxChange::Unchanged
    }
}

impl TryFrom<f64> for FluxChange {
    type Error = InvalidFluxChange;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value == 1. {
            Ok(FluxChange::Forward)
        } else if value == -1. {
            Ok(FluxChange::Backward)
        } else if value == 0. {
            Ok(FluxChange::Unchanged)
        } else {
            Err(InvalidFluxChange(value))
        }
    }
}

impl TryFrom<i64> for FluxChange {
    type Error = InvalidFluxChange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        FluxChange::try_from(value as f64)
    }
}

/// A label that isn't one of `-1`, `0` or `1`
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("{0} is not a valid flux change label, expected -1, 0 or 1")]
pub struct InvalidFluxChange(pub f64);

/// Drop decreases that can't happen
///
/// A reaction which carries no reference flux and can't run backwards (lower bound of
/// exactly 0) has nowhere to decrease to, so it is relabelled as unchanged.
pub fn clean_labels(labels: &[FluxChange], vref: &[f64], lower_bounds: &[f64]) -> Vec<FluxChange> {
    labels
        .iter()
        .zip(vref)
        .zip(lower_bounds)
        .map(|((&label, &v), &lb)| {
            if label == FluxChange::Backward && v.abs() < ZERO_FLUX_THRESHOLD && lb == 0. {
                FluxChange::Unchanged
            } else {
                label
            }
        })
        .collect()
}

/// Labels for the worst case scenario, reversed and then cleaned again
pub fn worst_case_labels(
    labels: &[FluxChange],
    vref: &[f64],
    lower_bounds: &[f64],
) -> Vec<FluxChange> {
    let reversed: Vec<FluxChange> = labels.iter().map(|l| l.reversed()).collect();
    clean_labels(&reversed, vref, lower_bounds)
}

/// Transformation score of `flux` relative to `vref`
///
/// Changes in the labelled direction add to the score, changes against it subtract,
/// and any drift on unchanged reactions subtracts. `flux == vref` scores exactly 0.
pub fn transformation_score(flux: &[f64], vref: &[f64], labels: &[FluxChange]) -> f64 {
    flux.iter()
        .zip(vref)
        .zip(labels)
        .map(|((&v, &r), &label)| match label {
            FluxChange::Unchanged => -(v - r).abs(),
            changed => changed.sign() * (v - r),
        })
        .sum()
}

/// Whether a solution has collapsed to (practically) no flux while the reference does
/// carry flux
pub fn is_collapsed(flux: &[f64], vref: &[f64]) -> bool {
    norm(flux) < COLLAPSE_NORM_THRESHOLD && norm(vref) >= COLLAPSE_NORM_THRESHOLD
}

/// Score a knockout solution, `None` meaning the solver found no usable solution
pub fn score_solution(
    flux: Option<&[f64]>,
    vref: &[f64],
    labels: &[FluxChange],
    check_collapse: bool,
) -> f64 {
    match flux {
        None => INVALID_SCORE,
        Some(flux) if check_collapse && is_collapsed(flux, vref) => INVALID_SCORE,
        Some(flux) => transformation_score(flux, vref, labels),
    }
}

/// Whether a score marks an invalid knockout
pub fn is_invalid(score: f64) -> bool {
    score.is_nan() || score < -SCORE_FLOOR_THRESHOLD
}

/// Combine best, MOMA and worst case scores into the robust transformation score
///
/// The raw value `(b - w) * m` has its sign flipped when the best case itself scored
/// badly, or when the best case didn't beat the worst case.
pub fn robust_score(b_ts: f64, mut m_ts: f64, w_ts: f64) -> f64 {
    if is_invalid(b_ts) || is_invalid(w_ts) {
        m_ts = INVALID_SCORE;
    }
    // Working through the algebra with infinities can produce NaN (0 * inf, inf - inf),
    // any invalid input gives an invalid result
    if is_invalid(b_ts) || is_invalid(w_ts) || is_invalid(m_ts) {
        return INVALID_SCORE;
    }
    let mut r_ts = (b_ts - w_ts) * m_ts;
    if b_ts < 0. && m_ts < 0. && r_ts > 0. {
        r_ts = -r_ts;
    }
    if b_ts < 0. && r_ts > 0. {
        r_ts = -r_ts;
    }
    if b_ts < w_ts && r_ts > 0. {
        r_ts = -r_ts;
    }
    r_ts
}

fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use FluxChange::*;

    #[test]
    fn labels_from_numbers() {
        assert_eq!(FluxChange::try_from(1.), Ok(Forward));
        assert_eq!(FluxChange::try_from(-1_i64), Ok(Backward));
        assert_eq!(FluxChange::try_from(0.), Ok(Unchanged));
        assert_eq!(FluxChange::try_from(0.5), Err(InvalidFluxChange(0.5)));
        assert_eq!(Forward.reversed(), Backward);
        assert_eq!(Unchanged.reversed(), Unchanged);
    }

    #[test]
    fn cleanup_only_touches_stuck_decreases() {
        let labels = [Backward, Backward, Backward, Forward];
        let vref = [0., 0., 2., 0.];
        let lb = [0., -10., 0., 0.];
        assert_eq!(
            clean_labels(&labels, &vref, &lb),
            vec![Unchanged, Backward, Backward, Forward]
        );
        // Reversal turns the forward label into a stuck decrease
        assert_eq!(
            worst_case_labels(&labels, &vref, &lb),
            vec![Forward, Forward, Forward, Unchanged]
        );
    }

    #[test]
    fn reference_flux_scores_zero() {
        let vref = [1., 0., -1.];
        let labels = [Forward, Unchanged, Backward];
        assert_eq!(transformation_score(&vref, &vref, &labels), 0.);
        // Moving in the desired directions only raises the score
        assert!((transformation_score(&[2., 0., -3.], &vref, &labels) - 3.).abs() < 1e-12);
        // Drift on an unchanged reaction is penalised either way
        assert!((transformation_score(&[1., -0.5, -1.], &vref, &labels) + 0.5).abs() < 1e-12);
        assert!((transformation_score(&[0., 0., 0.], &vref, &labels) + 2.).abs() < 1e-12);
    }

    #[test]
    fn collapsed_solutions_are_invalid() {
        let vref = [1., 0., -1.];
        let labels = [Forward, Unchanged, Backward];
        assert_eq!(
            score_solution(Some(&[0., 0., 0.]), &vref, &labels, true),
            INVALID_SCORE
        );
        assert!(
            (score_solution(Some(&[0., 0., 0.]), &vref, &labels, false) + 2.).abs() < 1e-12
        );
        assert_eq!(score_solution(None, &vref, &labels, false), INVALID_SCORE);
        // Nothing to collapse from
        assert!(!is_collapsed(&[0., 0.], &[0., 0.]));
    }

    #[test]
    fn robust_score_no_flip_when_best_dominates() {
        for (b, m, w) in [(3., 2., 1.), (0., 5., -2.), (4., 0., 4.), (2.5, 1., -7.)] {
            assert_eq!(robust_score(b, m, w), (b - w) * m);
        }
    }

    #[test]
    fn robust_score_flips() {
        // Negative best and negative MOMA
        assert_eq!(robust_score(-1., -2., -3.), -4.);
        // Negative best, positive product
        assert_eq!(robust_score(-1., 2., -3.), -4.);
        // Best below worst
        assert_eq!(robust_score(1., -2., 3.), -4.);
        // Already negative values are left alone
        assert_eq!(robust_score(3., -2., 1.), -4.);
    }

    #[test]
    fn invalid_scores_propagate() {
        assert_eq!(robust_score(INVALID_SCORE, 1., 0.), INVALID_SCORE);
        assert_eq!(robust_score(1., 1., INVALID_SCORE), INVALID_SCORE);
        assert_eq!(robust_score(1., INVALID_SCORE, 0.), INVALID_SCORE);
        assert_eq!(robust_score(-2e30, 1., 0.), INVALID_SCORE);
        assert!(is_invalid(f64::NAN));
        assert!(!is_invalid(-1e29));
    }
}
