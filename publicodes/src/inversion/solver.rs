//! Bracketed root finding
//!
//! `uniroot` is Brent's method: inverse quadratic interpolation or secant
//! steps, falling back to bisection whenever a step would leave the bracket
//! or converge too slowly. Function evaluations may fail (`Ok(None)`), in
//! which case the search stops without a root.

use crate::options::SolverOptions;
use crate::EngineResult;
use std::cmp::Ordering;

/// A sampled point `(x, f(x))`
pub type Sample = (f64, f64);

/// Find `x` in the bracket `[a, b]` with `|f(x)| <= tolerance`
///
/// `f(a)` and `f(b)` must have opposite signs (or one of them be zero).
/// After `max_iterations` evaluations the best estimate is returned.
pub fn uniroot<F>(
    f: &mut F,
    a: Sample,
    b: Sample,
    tolerance: f64,
    max_iterations: usize,
) -> EngineResult<Option<f64>>
where
    F: FnMut(f64) -> EngineResult<Option<f64>>,
{
    let ((mut a, mut fa), (mut b, mut fb)) = (a, b);
    if fa == 0.0 {
        return Ok(Some(a));
    }
    if fb == 0.0 {
        return Ok(Some(b));
    }
    if fa.signum() == fb.signum() {
        return Ok(None);
    }
    if fa.abs() < fb.abs() {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }

    let (mut c, mut fc) = (a, fa);
    let mut d = c;
    let mut bisected = true;
    for iteration in 0..max_iterations {
        if fb.abs() <= tolerance || (b - a).abs() <= f64::EPSILON * b.abs().max(1.0) {
            tracing::trace!(iteration, root = b, "uniroot converged");
            return Ok(Some(b));
        }

        let mut s = if fa != fc && fb != fc {
            a * fb * fc / ((fa - fb) * (fa - fc))
                + b * fa * fc / ((fb - fa) * (fb - fc))
                + c * fa * fb / ((fc - fa) * (fc - fb))
        } else {
            b - fb * (b - a) / (fb - fa)
        };

        let quarter = (3.0 * a + b) / 4.0;
        let outside = !((s > quarter.min(b)) && (s < quarter.max(b)));
        let slow = if bisected {
            (s - b).abs() >= (b - c).abs() / 2.0 || (b - c).abs() < tolerance
        } else {
            (s - b).abs() >= (c - d).abs() / 2.0 || (c - d).abs() < tolerance
        };
        bisected = outside || slow || !s.is_finite();
        if bisected {
            s = (a + b) / 2.0;
        }

        let Some(fs) = f(s)? else {
            return Ok(None);
        };
        if fs == 0.0 {
            return Ok(Some(s));
        }
        d = c;
        c = b;
        fc = fb;
        if fa.signum() != fs.signum() {
            b = s;
            fb = fs;
        } else {
            a = s;
            fa = fs;
        }
        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }
    }
    Ok(Some(b))
}

/// Two adjacent samples whose values straddle zero
fn straddling(samples: &[Sample]) -> Option<(Sample, Sample)> {
    let mut sorted: Vec<Sample> = samples.to_vec();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    sorted
        .windows(2)
        .find(|pair| pair[0].1 == 0.0 || pair[1].1 == 0.0 || pair[0].1.signum() != pair[1].1.signum())
        .map(|pair| (pair[0], pair[1]))
}

/// Derive a bracket from blind samples
///
/// The samples are tried first, then a secant extrapolation from the last
/// two, then the configured bounds.
pub fn bracket<F>(
    f: &mut F,
    samples: &[Sample],
    options: &SolverOptions,
) -> EngineResult<Option<(Sample, Sample)>>
where
    F: FnMut(f64) -> EngineResult<Option<f64>>,
{
    let mut samples: Vec<Sample> = samples
        .iter()
        .copied()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    if let Some(found) = straddling(&samples) {
        return Ok(Some(found));
    }

    if let [.., (x0, y0), (x1, y1)] = samples[..] {
        let x2 = x1 - y1 * (x1 - x0) / (y1 - y0);
        if x2.is_finite() && x2 > options.min && x2 < options.max && x2 != x1 {
            if let Some(y2) = f(x2)?.filter(|y| y.is_finite()) {
                samples.push((x2, y2));
                if let Some(found) = straddling(&samples) {
                    return Ok(Some(found));
                }
            }
        }
    }

    for bound in [options.min, options.max] {
        if let Some(y) = f(bound)?.filter(|y| y.is_finite()) {
            samples.push((bound, y));
        }
    }
    Ok(straddling(&samples))
}
