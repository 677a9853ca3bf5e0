#[cfg(test)]
mod test {
    use ndarray::Array2;

    use crate::test::helpers::{assert_close, random_coo};
    use crate::{ccd_run, CcdWorkspace, CompletionModel, CooTensor};

    /// Straightforward CCD over the coordinate form: identical math to the
    /// CSF kernel, one flat pass over the nonzeros per step. All-ones
    /// initialization.
    fn reference_ccd(
        tt: &CooTensor<f64>,
        rank: usize,
        lambda: f64,
        epochs: usize,
    ) -> (Vec<Array2<f64>>, f64) {
        let dims = tt.dims();
        let mut factors: Vec<Array2<f64>> =
            dims.iter().map(|&d| Array2::ones((d, rank))).collect();

        let predict = |factors: &[Array2<f64>], coords: &[usize]| -> f64 {
            (0..rank)
                .map(|f| {
                    factors
                        .iter()
                        .zip(coords)
                        .map(|(fac, &i)| fac[[i, f]])
                        .product::<f64>()
                })
                .sum()
        };

        let mut residual: Vec<f64> = (0..tt.nnz())
            .map(|n| tt.vals()[n] - predict(&factors, &tt.coords(n)))
            .collect();

        let mut loss = 0.0;
        for _ in 0..epochs {
            for f in 0..rank {
                for n in 0..tt.nnz() {
                    let coords = tt.coords(n);
                    let prod: f64 = factors
                        .iter()
                        .zip(&coords)
                        .map(|(fac, &i)| fac[[i, f]])
                        .product();
                    residual[n] += prod;
                }
                for m in 0..3 {
                    let mut numer = vec![0.0; dims[m]];
                    let mut denom = vec![lambda; dims[m]];
                    for n in 0..tt.nnz() {
                        let coords = tt.coords(n);
                        let s: f64 = factors
                            .iter()
                            .enumerate()
                            .filter(|&(m2, _)| m2 != m)
                            .map(|(m2, fac)| fac[[coords[m2], f]])
                            .product();
                        numer[coords[m]] += residual[n] * s;
                        denom[coords[m]] += s * s;
                    }
                    for i in 0..dims[m] {
                        factors[m][[i, f]] = numer[i] / denom[i];
                    }
                }
                loss = 0.0;
                for n in 0..tt.nnz() {
                    let coords = tt.coords(n);
                    let prod: f64 = factors
                        .iter()
                        .zip(&coords)
                        .map(|(fac, &i)| fac[[i, f]])
                        .product();
                    residual[n] -= prod;
                    loss += residual[n] * residual[n];
                }
            }
        }
        (factors, loss)
    }

    #[test]
    fn matches_coordinate_reference_rank1() {
        let tt = random_coo(&[5, 4, 6], 30, 19);
        let (gold_factors, gold_loss) = reference_ccd(&tt, 1, 0.5, 2);

        let mut model = CompletionModel::ones(tt.dims(), 1);
        let mut ws = CcdWorkspace::new(vec![0.5, 0.5, 0.5], 2, 1);
        let reports = ccd_run(&tt, &tt, &mut model, &mut ws, |_| false).unwrap();

        for m in 0..3 {
            for (a, b) in model.factor(m).iter().zip(gold_factors[m].iter()) {
                assert_close(*a, *b, 1e-10);
            }
        }
        assert_close(reports.last().unwrap().loss_sq, gold_loss, 1e-10);
    }

    #[test]
    fn matches_coordinate_reference_rank3() {
        let tt = random_coo(&[6, 3, 5], 40, 29);
        let (gold_factors, gold_loss) = reference_ccd(&tt, 3, 1.25, 2);

        let mut model = CompletionModel::ones(tt.dims(), 3);
        let mut ws = CcdWorkspace::new(vec![1.25, 1.25, 1.25], 2, 1);
        let reports = ccd_run(&tt, &tt, &mut model, &mut ws, |_| false).unwrap();

        for m in 0..3 {
            for (a, b) in model.factor(m).iter().zip(gold_factors[m].iter()) {
                assert_close(*a, *b, 1e-10);
            }
        }
        assert_close(reports.last().unwrap().loss_sq, gold_loss, 1e-10);
    }

    #[test]
    fn single_worker_runs_are_bitwise_reproducible() {
        // P8, one-worker half: identical runs produce identical bits
        let tt = random_coo(&[5, 5, 5], 25, 41);
        let run = || {
            let mut model = CompletionModel::ones(tt.dims(), 2);
            let mut ws = CcdWorkspace::new(vec![1.0, 1.0, 1.0], 3, 1);
            ccd_run(&tt, &tt, &mut model, &mut ws, |_| false).unwrap();
            model
        };
        let a = run();
        let b = run();
        for m in 0..3 {
            for (x, y) in a.factor(m).iter().zip(b.factor(m).iter()) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
        }
    }

    #[test]
    fn validation_rmse_is_reported() {
        let tt = random_coo(&[4, 4, 4], 20, 53);
        let validate = random_coo(&[4, 4, 4], 10, 54);
        let mut model = CompletionModel::ones(tt.dims(), 2);
        let mut ws = CcdWorkspace::new(vec![1.0, 1.0, 1.0], 2, 2);
        let reports = ccd_run(&tt, &validate, &mut model, &mut ws, |_| false).unwrap();
        let last = reports.last().unwrap();
        assert_close(last.val_rmse, model.rmse(&validate), 1e-12);
        assert_close(last.objective, last.loss_sq + last.frob_sq, 1e-12);
    }
}
