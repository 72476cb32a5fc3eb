//! Continuous-Time Algebraic Riccati Equation
//!
//! Solves AᵗS + SA − SBR⁻¹BᵗS + Q = 0 for the stabilizing solution S via
//! the stable invariant subspace of the associated Hamiltonian matrix, and
//! provides the structural checks (controllability, stabilizability) that
//! explain why a given problem has no such solution.

use std::os::raw::c_char;

use ndarray::{s, Array1, Array2, ShapeBuilder};
use ndarray_linalg::{Eig, Inverse, OperationNorm, SVD};
use num_complex::Complex;

use crate::error::{LqrError, Result};

/// Safety factor applied to `n·ε·‖M‖` when no tolerance is supplied.
const DEFAULT_TOLERANCE_FACTOR: f64 = 1.0e3;

/// Largest accepted 1-norm condition number of the top block U₁₁ of the
/// stable Schur basis.
const MAX_BASIS_CONDITION: f64 = 1.0e10;

/// Relative bound on the ARE residual of the returned S.
const RESIDUAL_RTOL: f64 = 1.0e-8;

/// Default tolerance: a small epsilon scaled to the matrix dimension and
/// norm, `1e3 · n · ε · max(‖M‖_F, 1)`.
pub fn default_tolerance(n: usize, norm: f64) -> f64 {
    DEFAULT_TOLERANCE_FACTOR * (n.max(1) as f64) * f64::EPSILON * norm.max(1.0)
}

/// Solve the continuous-time algebraic Riccati equation
///
/// Computes the symmetric stabilizing solution S of
///
/// ```text
/// AᵗS + SA − SBR⁻¹BᵗS + Q = 0
/// ```
///
/// i.e. the unique solution for which A − BR⁻¹BᵗS has all eigenvalues in the
/// open left half-plane.
///
/// # Arguments
///
/// * `a` - N×N state matrix
/// * `b` - N×M input matrix
/// * `q` - N×N state weighting, symmetric positive semidefinite
/// * `r` - M×M input weighting, symmetric positive definite
/// * `tol` - Optional tolerance for the symmetry checks on Q and R and for
///   deciding that a Hamiltonian eigenvalue sits on the imaginary axis.
///   None uses [`default_tolerance`] on the Hamiltonian.
///
/// # Returns
///
/// The N×N solution S, exactly symmetric.
///
/// # Errors
///
/// * `DimensionMismatch` - shapes of A, B, Q, R are inconsistent
/// * `SingularCostMatrix` - R is zero, singular or numerically singular
/// * `AsymmetricCostMatrix` - Q or R is not symmetric within `tol`
/// * `InvalidTolerance` - `tol` is not a positive finite number
/// * `RiccatiUnsolvable` - the stable subspace cannot be separated cleanly
///   ((A,B) not stabilizable, (A,Q^½) not detectable, or ill-conditioning)
///
/// # Algorithm
///
/// 1. **Validation**: shapes, invertibility of R (checked before anything
///    else numerical), symmetry of Q and R
/// 2. **Hamiltonian**: H = [[A, −BR⁻¹Bᵗ], [−Q, −Aᵗ]] (2N×2N)
/// 3. **Ordered Schur form**: H = U·T·Uᵗ with the eigenvalues of negative
///    real part moved to the leading N×N block of T (LAPACK DGEES, SORT = 'S')
/// 4. **Spectrum split**: the spectrum of H is symmetric about the imaginary
///    axis; exactly N eigenvalues must satisfy Re(λ) < −tol and none may lie
///    within tol of the axis
/// 5. **Subspace**: the first N Schur vectors [U₁₁; U₂₁] span the stable
///    invariant subspace; check the conditioning of U₁₁ and form
///    S = U₂₁·U₁₁⁻¹, then symmetrize S = (S + Sᵗ)/2
/// 6. **Verification**: the relative ARE residual must be small
///
/// Schur vectors stay orthonormal when a stable eigenvalue is defective, so
/// critically damped designs (repeated closed-loop poles) are solved to
/// full accuracy.
///
/// # Examples
///
/// ```
/// use lqr_rs::riccati::{care_residual, solve_care};
/// use ndarray::{arr2, Array2};
///
/// // Double integrator with unit weights
/// let a = arr2(&[[0.0, 1.0], [0.0, 0.0]]);
/// let b = arr2(&[[0.0], [1.0]]);
/// let q = Array2::eye(2);
/// let r = Array2::eye(1);
///
/// let s = solve_care(&a, &b, &q, &r, None).unwrap();
/// assert!((s[(0, 0)] - 3.0_f64.sqrt()).abs() < 1e-8);
/// assert!((s[(0, 1)] - 1.0).abs() < 1e-8);
/// assert!(care_residual(&a, &b, &q, &r, &s).unwrap() < 1e-8);
/// ```
pub fn solve_care(
    a: &Array2<f64>,
    b: &Array2<f64>,
    q: &Array2<f64>,
    r: &Array2<f64>,
    tol: Option<f64>,
) -> Result<Array2<f64>> {
    let (n, _m) = check_shapes(a, b, q, r)?;
    if let Some(t) = tol {
        if !t.is_finite() || t <= 0.0 {
            return Err(LqrError::InvalidTolerance(t));
        }
    }

    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }

    // Step 1: R must be invertible before H can be formed
    let r_inv = invert_cost_matrix(r)?;

    // Step 2: Hamiltonian
    let g = b.dot(&r_inv).dot(&b.t());
    let h = hamiltonian(a, &g, q);
    let toldef = match tol {
        Some(t) => t,
        None => default_tolerance(2 * n, h.opnorm_fro()?),
    };

    check_symmetric("Q", q, toldef)?;
    check_symmetric("R", r, toldef)?;

    // Step 3: real Schur form with the stable eigenvalues leading
    let schur = ordered_schur(&h)?;

    // Step 4: exactly N stable eigenvalues, none on the axis
    check_spectrum_split(&schur.eigenvalues, n, toldef)?;
    if schur.selected != n {
        return Err(LqrError::unsolvable(format!(
            "DGEES ordered {} eigenvalues into the stable block, expected {n}",
            schur.selected
        )));
    }
    log::debug!(
        "Hamiltonian spectrum split: {n} stable of {} (axis tolerance {toldef:e})",
        2 * n
    );

    // Step 5: S = U₂₁·U₁₁⁻¹ from the stable Schur basis
    let u11 = schur.vectors.slice(s![..n, ..n]).to_owned();
    let u21 = schur.vectors.slice(s![n.., ..n]).to_owned();

    let u11_inv = u11
        .inv()
        .map_err(|_| LqrError::unsolvable("stable Schur basis U₁₁ is singular"))?;
    let condition = u11.opnorm_one()? * u11_inv.opnorm_one()?;
    if !condition.is_finite() || condition > MAX_BASIS_CONDITION {
        return Err(LqrError::unsolvable(format!(
            "stable Schur basis U₁₁ is ill-conditioned (κ₁ = {condition:e})"
        )));
    }
    let s_raw = u21.dot(&u11_inv);
    let solution = (&s_raw + &s_raw.t()) * 0.5;

    // Step 6: verify against the equation itself
    let res_norm = residual_matrix(a, &g, q, &solution).opnorm_fro()?;
    let s_norm = solution.opnorm_fro()?;
    let scale = 1.0
        + q.opnorm_fro()?
        + s_norm * (2.0 * a.opnorm_fro()? + g.opnorm_fro()? * s_norm);
    log::debug!("Riccati residual ‖·‖_F = {res_norm:e} (scale {scale:e})");
    if !res_norm.is_finite() || res_norm > RESIDUAL_RTOL * scale {
        return Err(LqrError::unsolvable(format!(
            "Riccati residual {res_norm:e} exceeds tolerance"
        )));
    }

    Ok(solution)
}

/// Real Schur decomposition of a square matrix, reordered.
struct OrderedSchur {
    /// Orthogonal Schur vectors U, column by column.
    vectors: Array2<f64>,
    /// Eigenvalues in the order they appear on the diagonal of T.
    eigenvalues: Array1<Complex<f64>>,
    /// Number of leading eigenvalues that satisfied the selection.
    selected: usize,
}

/// DGEES selection: eigenvalues with negative real part go first.
unsafe extern "C" fn select_left_half_plane(wr: *const f64, _wi: *const f64) -> i32 {
    i32::from(*wr < 0.0)
}

/// Ordered real Schur form via LAPACK DGEES with JOBVS = 'V', SORT = 'S'.
fn ordered_schur(h: &Array2<f64>) -> Result<OrderedSchur> {
    let dim = h.nrows();
    let n_i32 = i32::try_from(dim).map_err(|_| {
        LqrError::unsolvable(format!("Hamiltonian order {dim} exceeds LAPACK range"))
    })?;

    // Column-major copy for Fortran; DGEES overwrites it with T
    let mut t: Vec<f64> = h.t().iter().copied().collect();
    let mut wr = vec![0.0f64; dim];
    let mut wi = vec![0.0f64; dim];
    let mut vs = vec![0.0f64; dim * dim];
    let mut bwork = vec![0i32; dim];
    let mut sdim: i32 = 0;
    let mut info: i32 = 0;
    let jobvs = b'V' as c_char;
    let sort = b'S' as c_char;
    let select: unsafe extern "C" fn(*const f64, *const f64) -> i32 = select_left_half_plane;

    // Workspace query (lwork = -1)
    let mut work_query = [0.0f64];
    unsafe {
        lapack_sys::dgees_(
            &jobvs,
            &sort,
            Some(select),
            &n_i32,
            t.as_mut_ptr(),
            &n_i32,
            &mut sdim,
            wr.as_mut_ptr(),
            wi.as_mut_ptr(),
            vs.as_mut_ptr(),
            &n_i32,
            work_query.as_mut_ptr(),
            &-1,
            bwork.as_mut_ptr(),
            &mut info,
        );
    }
    if info != 0 {
        return Err(LqrError::unsolvable(format!(
            "DGEES workspace query failed with INFO={info}"
        )));
    }

    let lwork = (work_query[0] as usize).max(3 * dim).max(1);
    let lwork_i32 = i32::try_from(lwork).map_err(|_| {
        LqrError::unsolvable(format!("DGEES workspace {lwork} exceeds LAPACK range"))
    })?;
    let mut work = vec![0.0f64; lwork];

    unsafe {
        lapack_sys::dgees_(
            &jobvs,
            &sort,
            Some(select),
            &n_i32,
            t.as_mut_ptr(),
            &n_i32,
            &mut sdim,
            wr.as_mut_ptr(),
            wi.as_mut_ptr(),
            vs.as_mut_ptr(),
            &n_i32,
            work.as_mut_ptr(),
            &lwork_i32,
            bwork.as_mut_ptr(),
            &mut info,
        );
    }

    match info {
        0 => {}
        i if i == n_i32 + 1 => {
            return Err(LqrError::unsolvable(
                "Hamiltonian eigenvalues too close to separate during reordering",
            ))
        }
        i if i == n_i32 + 2 => {
            return Err(LqrError::unsolvable(
                "rounding moved a Hamiltonian eigenvalue across the imaginary axis",
            ))
        }
        i => return Err(LqrError::unsolvable(format!("DGEES failed with INFO={i}"))),
    }

    let vectors = Array2::from_shape_vec((dim, dim).f(), vs)
        .map_err(|e| LqrError::unsolvable(format!("Schur vector layout: {e}")))?;
    let eigenvalues = wr
        .iter()
        .zip(wi.iter())
        .map(|(&re, &im)| Complex::new(re, im))
        .collect();

    Ok(OrderedSchur {
        vectors,
        eigenvalues,
        selected: sdim.max(0) as usize,
    })
}

/// Frobenius norm of the Riccati residual AᵗS + SA − SBR⁻¹BᵗS + Q.
///
/// # Errors
///
/// `DimensionMismatch` for inconsistent shapes (including S),
/// `SingularCostMatrix` when R cannot be inverted.
pub fn care_residual(
    a: &Array2<f64>,
    b: &Array2<f64>,
    q: &Array2<f64>,
    r: &Array2<f64>,
    s: &Array2<f64>,
) -> Result<f64> {
    let (n, _) = check_shapes(a, b, q, r)?;
    if s.shape() != [n, n] {
        return Err(LqrError::shape("S", (n, n), s.shape()));
    }
    if n == 0 {
        return Ok(0.0);
    }
    let r_inv = invert_cost_matrix(r)?;
    let g = b.dot(&r_inv).dot(&b.t());
    Ok(residual_matrix(a, &g, q, s).opnorm_fro()?)
}

/// Build the 2N×2N Hamiltonian [[A, −G], [−Q, −Aᵗ]] with G = BR⁻¹Bᵗ.
fn hamiltonian(a: &Array2<f64>, g: &Array2<f64>, q: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let mut h = Array2::zeros((2 * n, 2 * n));
    h.slice_mut(s![..n, ..n]).assign(a);
    h.slice_mut(s![..n, n..]).assign(&g.mapv(|v| -v));
    h.slice_mut(s![n.., ..n]).assign(&q.mapv(|v| -v));
    h.slice_mut(s![n.., n..]).assign(&a.t().mapv(|v| -v));
    h
}

fn residual_matrix(
    a: &Array2<f64>,
    g: &Array2<f64>,
    q: &Array2<f64>,
    s: &Array2<f64>,
) -> Array2<f64> {
    a.t().dot(s) + s.dot(a) - s.dot(g).dot(s) + q
}

/// Exactly `n` eigenvalues with Re(λ) < 0 are required and none may sit
/// within `tol` of the imaginary axis.
fn check_spectrum_split(eigenvalues: &Array1<Complex<f64>>, n: usize, tol: f64) -> Result<()> {
    if let Some(on_axis) = eigenvalues.iter().find(|l| l.re.abs() <= tol || l.re.is_nan()) {
        return Err(LqrError::unsolvable(format!(
            "Hamiltonian eigenvalue {on_axis} lies within {tol:e} of the imaginary axis"
        )));
    }
    let stable = eigenvalues.iter().filter(|l| l.re < 0.0).count();
    if stable != n {
        return Err(LqrError::unsolvable(format!(
            "expected {n} stable Hamiltonian eigenvalues, found {stable}"
        )));
    }
    Ok(())
}

/// Invert R, rejecting exactly and numerically singular matrices.
pub(crate) fn invert_cost_matrix(r: &Array2<f64>) -> Result<Array2<f64>> {
    let m = r.nrows();
    if r.iter().any(|v| !v.is_finite()) {
        return Err(LqrError::SingularCostMatrix {
            reason: "R has non-finite entries".to_string(),
        });
    }
    let r_norm = r.opnorm_one()?;
    if r_norm == 0.0 {
        return Err(LqrError::SingularCostMatrix {
            reason: "R is the zero matrix".to_string(),
        });
    }
    let r_inv = r.inv().map_err(|e| LqrError::SingularCostMatrix {
        reason: format!("LU factorization failed: {e}"),
    })?;
    let rcond = 1.0 / (r_norm * r_inv.opnorm_one()?);
    if !rcond.is_finite() || rcond < (m as f64) * f64::EPSILON {
        return Err(LqrError::SingularCostMatrix {
            reason: format!("reciprocal condition number {rcond:e} below machine precision"),
        });
    }
    Ok(r_inv)
}

fn check_shapes(
    a: &Array2<f64>,
    b: &Array2<f64>,
    q: &Array2<f64>,
    r: &Array2<f64>,
) -> Result<(usize, usize)> {
    let n = a.nrows();
    let m = b.ncols();
    if a.ncols() != n {
        return Err(LqrError::shape("A", (n, n), a.shape()));
    }
    if b.nrows() != n || m == 0 {
        return Err(LqrError::shape("B", (n, m.max(1)), b.shape()));
    }
    if q.shape() != [n, n] {
        return Err(LqrError::shape("Q", (n, n), q.shape()));
    }
    if r.shape() != [m, m] {
        return Err(LqrError::shape("R", (m, m), r.shape()));
    }
    Ok((n, m))
}

fn check_symmetric(name: &'static str, mat: &Array2<f64>, tol: f64) -> Result<()> {
    let deviation = (mat - &mat.t()).iter().map(|v| v.abs()).fold(0.0_f64, f64::max);
    let scale = mat.iter().map(|v| v.abs()).fold(0.0_f64, f64::max).max(1.0);
    if deviation > tol * scale {
        return Err(LqrError::AsymmetricCostMatrix { name, deviation });
    }
    Ok(())
}

/// Controllability matrix [B AB A²B … Aⁿ⁻¹B] (N × N·M).
pub fn controllability_matrix(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let m = b.ncols();
    let mut ctrb = Array2::zeros((n, n * m));
    let mut block = b.clone();
    for k in 0..n {
        ctrb.slice_mut(s![.., k * m..(k + 1) * m]).assign(&block);
        block = a.dot(&block);
    }
    ctrb
}

/// Check that every mode of A with Re(λ) ≥ 0 is controllable.
///
/// Uses the Popov-Belevitch-Hautus test: (A, B) is stabilizable iff
/// rank [λI − A, B] = N for every eigenvalue λ of A in the closed right
/// half-plane. Ranks are computed from singular values with threshold
/// `tol` (None uses `max(N, N+M) · ε · σ_max`).
///
/// Stabilizability of (A, B) together with detectability of (A, Q^½),
/// i.e. stabilizability of (Aᵗ, Q), is what [`solve_care`] needs.
///
/// # Examples
///
/// ```
/// use lqr_rs::riccati::is_stabilizable;
/// use ndarray::arr2;
///
/// // Unstable mode at +1 is not reachable from the input
/// let a = arr2(&[[1.0, 0.0], [0.0, -1.0]]);
/// let b = arr2(&[[0.0], [1.0]]);
/// assert!(!is_stabilizable(&a, &b, None).unwrap());
///
/// // Uncontrollable but already stable mode is fine
/// let a = arr2(&[[-1.0, 0.0], [0.0, 1.0]]);
/// assert!(is_stabilizable(&a, &b, None).unwrap());
/// ```
pub fn is_stabilizable(a: &Array2<f64>, b: &Array2<f64>, tol: Option<f64>) -> Result<bool> {
    let n = a.nrows();
    let m = b.ncols();
    if a.ncols() != n {
        return Err(LqrError::shape("A", (n, n), a.shape()));
    }
    if b.nrows() != n {
        return Err(LqrError::shape("B", (n, m), b.shape()));
    }
    if n == 0 {
        return Ok(true);
    }

    let (eigenvalues, _) = a.eig()?;
    for lambda in eigenvalues.iter().filter(|l| l.re >= 0.0) {
        let mut pbh = Array2::<Complex<f64>>::zeros((n, n + m));
        for i in 0..n {
            for j in 0..n {
                let diag = if i == j { *lambda } else { Complex::new(0.0, 0.0) };
                pbh[(i, j)] = diag - Complex::new(a[(i, j)], 0.0);
            }
            for j in 0..m {
                pbh[(i, n + j)] = Complex::new(b[(i, j)], 0.0);
            }
        }
        let (_, singular_values, _) = pbh.svd(false, false)?;
        let sv_max = singular_values.iter().cloned().fold(0.0_f64, f64::max);
        let threshold =
            tol.unwrap_or_else(|| ((n + m) as f64) * f64::EPSILON * sv_max.max(f64::MIN_POSITIVE));
        let rank = singular_values.iter().filter(|&&sv| sv > threshold).count();
        if rank < n {
            return Ok(false);
        }
    }
    Ok(true)
}
