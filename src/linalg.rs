//! Matrix multiply as an external function.
//!
//! `R = A · B` with `A: n×k`, `B: k×m`, `R: n×m` is recorded as a single
//! record instead of `n·m·k` elementary statements. Derivatives:
//!
//! - forward: `Ṙ = Ȧ·B + A·Ḃ`
//! - reverse: `Ā += R̄·Bᵀ`, `B̄ += Aᵀ·R̄`
//!
//! The dense products are computed with nalgebra.

use std::marker::PhantomData;

use nalgebra::{DMatrix, RealField};

use crate::active::Active;
use crate::external::{
    Activity, ArrayArgument, DeleteContext, ExternalFunction, FieldVisitor, InputUse,
    RecordLayout, ReplayContext,
};
use crate::float::Float;
use crate::index::IndexManager;
use crate::tape::Tape;

/// Element order of a flat matrix slice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Storage {
    #[default]
    RowMajor = 0,
    ColMajor = 1,
}

impl Storage {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Storage::RowMajor,
            _ => Storage::ColMajor,
        }
    }

    /// Flat offset of element `(i, j)` of a `rows × cols` matrix.
    #[inline]
    pub fn offset(self, rows: usize, cols: usize, i: usize, j: usize) -> usize {
        match self {
            Storage::RowMajor => i * cols + j,
            Storage::ColMajor => j * rows + i,
        }
    }

    fn matrix<F: Float + RealField>(self, rows: usize, cols: usize, data: &[F]) -> DMatrix<F> {
        match self {
            Storage::RowMajor => DMatrix::from_row_slice(rows, cols, data),
            Storage::ColMajor => DMatrix::from_column_slice(rows, cols, data),
        }
    }

    fn write<F: Float + RealField>(self, mat: &DMatrix<F>, out: &mut [F]) {
        let (rows, cols) = mat.shape();
        for i in 0..rows {
            for j in 0..cols {
                out[self.offset(rows, cols, i, j)] = mat[(i, j)];
            }
        }
    }
}

const ARG_A: usize = 0;
const ARG_B: usize = 1;

#[derive(Debug, Default)]
struct MatMulRecord<F: Float> {
    activity: Activity,
    storage: u8,
    n: u32,
    k: u32,
    m: u32,
    a: ArrayArgument<F>,
    b: ArrayArgument<F>,
    r: ArrayArgument<F>,
}

impl<F: Float> MatMulRecord<F> {
    fn dims(&self) -> (usize, usize, usize) {
        (self.n as usize, self.k as usize, self.m as usize)
    }
}

impl<F: Float> RecordLayout<F> for MatMulRecord<F> {
    fn visit<V: FieldVisitor<F>>(&mut self, v: &mut V) {
        v.activity(&mut self.activity);
        v.passive(&mut self.storage);
        v.passive(&mut self.n);
        v.passive(&mut self.k);
        v.passive(&mut self.m);
        let (n, k, m) = self.dims();
        let a_active = self.activity.get(ARG_A);
        let b_active = self.activity.get(ARG_B);
        // Each factor's values are needed for the other factor's derivative.
        v.input(&mut self.a, n * k, InputUse::new(a_active, b_active));
        v.input(&mut self.b, k * m, InputUse::new(b_active, a_active));
        v.output(&mut self.r, n * m);
    }
}

/// The matrix multiply external function, one token per real type.
pub struct MatrixMultiply<F>(PhantomData<F>);

impl<F: Float + RealField> ExternalFunction<F> for MatrixMultiply<F> {
    const NAME: &'static str = "matrix_multiply";

    fn forward(ctx: &mut ReplayContext<'_, F>) {
        ctx.forward::<MatMulRecord<F>>(|rec, vectors| {
            let (n, k, m) = rec.dims();
            let storage = Storage::from_u8(rec.storage);
            let a_active = rec.activity.get(ARG_A);
            let b_active = rec.activity.get(ARG_B);

            let mut r_dot = DMatrix::<F>::zeros(n, m);
            if a_active {
                rec.a.gather_gradients(vectors);
                let a_dot = storage.matrix(n, k, &rec.a.gradients);
                r_dot += a_dot * storage.matrix(k, m, &rec.b.values);
            }
            if b_active {
                rec.b.gather_gradients(vectors);
                let b_dot = storage.matrix(k, m, &rec.b.gradients);
                r_dot += storage.matrix(n, k, &rec.a.values) * b_dot;
            }

            if vectors.has_primals() {
                let r = storage.matrix(n, k, &rec.a.values) * storage.matrix(k, m, &rec.b.values);
                storage.write(&r, &mut rec.r.values);
                rec.r.write_primals(vectors);
            }
            storage.write(&r_dot, &mut rec.r.gradients);
            rec.r.scatter_gradients(vectors);
        });
    }

    fn reverse(ctx: &mut ReplayContext<'_, F>) {
        ctx.reverse::<MatMulRecord<F>>(|rec, vectors| {
            let (n, k, m) = rec.dims();
            let storage = Storage::from_u8(rec.storage);

            rec.r.take_gradients(vectors);
            let r_bar = storage.matrix(n, m, &rec.r.gradients);

            if rec.activity.get(ARG_A) {
                let b = storage.matrix(k, m, &rec.b.values);
                let a_bar = &r_bar * b.transpose();
                storage.write(&a_bar, &mut rec.a.gradients);
                rec.a.accumulate_gradients(vectors);
            }
            if rec.activity.get(ARG_B) {
                let a = storage.matrix(n, k, &rec.a.values);
                let b_bar = a.transpose() * &r_bar;
                storage.write(&b_bar, &mut rec.b.gradients);
                rec.b.accumulate_gradients(vectors);
            }
        });
    }

    fn delete(ctx: &mut DeleteContext<'_, F>) {
        ctx.delete::<MatMulRecord<F>>(|_| {});
    }
}

/// Compute `r = a · b` and record it on `tape` as one external record.
///
/// `a` is `n×k`, `b` is `k×m`, `r` is `n×m`, all flat in `storage` order.
/// If neither factor is active nothing is recorded. Otherwise an element of
/// `r` becomes active only if its row of `a` or its column of `b` holds an
/// active element; the rest stay passive.
#[allow(clippy::too_many_arguments)]
pub fn matrix_multiply<F: Float + RealField, I: IndexManager>(
    tape: &mut Tape<F, I>,
    storage: Storage,
    a: &[Active<F>],
    b: &[Active<F>],
    r: &mut [Active<F>],
    n: usize,
    k: usize,
    m: usize,
) {
    assert_eq!(a.len(), n * k, "matrix_multiply: a must hold n*k elements");
    assert_eq!(b.len(), k * m, "matrix_multiply: b must hold k*m elements");
    assert_eq!(r.len(), n * m, "matrix_multiply: r must hold n*m elements");

    let values = |x: &[Active<F>]| x.iter().map(|e| e.value).collect::<Vec<_>>();
    let product = storage.matrix(n, k, &values(a)) * storage.matrix(k, m, &values(b));
    for i in 0..n {
        for j in 0..m {
            r[storage.offset(n, m, i, j)].value = product[(i, j)];
        }
    }

    let mut activity = Activity::default();
    activity.set(ARG_A, a.iter().any(Active::is_active));
    activity.set(ARG_B, b.iter().any(Active::is_active));
    if !activity.any() {
        for out in r.iter_mut() {
            tape.free_identifier(&mut out.identifier);
        }
        return;
    }

    let row_active: Vec<bool> = (0..n)
        .map(|i| (0..k).any(|l| a[storage.offset(n, k, i, l)].is_active()))
        .collect();
    let col_active: Vec<bool> = (0..m)
        .map(|j| (0..k).any(|l| b[storage.offset(k, m, l, j)].is_active()))
        .collect();

    let scratch = tape.scratch();
    let mut record = MatMulRecord {
        activity,
        storage: storage as u8,
        n: n as u32,
        k: k as u32,
        m: m as u32,
        a: ArrayArgument::from_inputs(scratch, a),
        b: ArrayArgument::from_inputs(scratch, b),
        r: ArrayArgument::outputs(scratch, n * m),
    };

    for i in 0..n {
        for j in 0..m {
            let idx = storage.offset(n, m, i, j);
            let out = &mut r[idx];
            if row_active[i] || col_active[j] {
                record.r.old_values[idx] = tape.register_external_output(out);
            } else {
                tape.free_identifier(&mut out.identifier);
            }
            record.r.identifiers[idx] = out.identifier;
            record.r.values[idx] = out.value;
        }
    }

    let token = MatrixMultiply::<F>::token();
    tape.store_external(token, &mut record);
    tape.release_record(&mut record);
}
