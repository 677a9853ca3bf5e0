#[cfg(test)]
mod test {
    use crate::test::helpers::{entry_multiset, random_coo};
    use crate::{Csf, CsfAlloc, CsfTile, ModePermPolicy, Options, TilePolicy};

    fn collect_entries(csf: &Csf<f64>) -> Vec<(Vec<usize>, f64)> {
        let mut out = Vec::new();
        csf.for_each_nonzero(|coords, v| out.push((coords.to_vec(), v)));
        out
    }

    fn original_entries(tt: &crate::CooTensor<f64>) -> Vec<(Vec<usize>, f64)> {
        (0..tt.nnz()).map(|n| (tt.coords(n), tt.vals()[n])).collect()
    }

    /// Structural invariants of one tile: monotone pointers, matching fiber
    /// counts, sorted fiber ids within every parent range.
    fn check_tile(tile: &CsfTile<f64>, nmodes: usize, dims: &[usize], perm: &[usize]) {
        for level in 0..nmodes - 1 {
            let fptr = tile.fptr(level);
            assert_eq!(fptr.len(), tile.nfibs(level) + 1);
            assert!(fptr.windows(2).all(|w| w[0] <= w[1]));
            let next = if level + 1 == nmodes - 1 {
                tile.nnz()
            } else {
                tile.nfibs(level + 1)
            };
            assert_eq!(*fptr.last().unwrap(), next);

            // children strictly increase within one parent for non-leaf levels
            if level + 1 < nmodes - 1 {
                let view = tile.fids_view(level + 1);
                for w in fptr.windows(2) {
                    for pair in (w[0]..w[1]).collect::<Vec<_>>().windows(2) {
                        assert!(view.id(pair[0]) < view.id(pair[1]));
                    }
                }
            }
        }
        for level in 0..nmodes {
            let view = tile.fids_view(level);
            for f in 0..tile.nfibs(level) {
                assert!(view.id(f) < dims[perm[level]]);
            }
        }
        assert_eq!(tile.nnz(), tile.nfibs(nmodes - 1));
    }

    #[test]
    fn round_trip_across_policies() {
        // P1: building and materializing reproduces the input multiset
        let tt = random_coo(&[6, 4, 9], 40, 11);
        let gold = entry_multiset(&original_entries(&tt));

        let policies = [
            (TilePolicy::NoTile, 0),
            (TilePolicy::DenseTile, 0),
            (TilePolicy::DenseTile, 1),
            (TilePolicy::SyncTile, 0),
        ];
        let perms = [
            ModePermPolicy::SortedSmallFirst,
            ModePermPolicy::SortedSmallFirstMinusOne(2),
            ModePermPolicy::Explicit(vec![2, 0, 1]),
        ];
        for (tile, depth) in policies {
            for perm in &perms {
                let opts = Options::default()
                    .with_nthreads(3)
                    .with_tiling(tile, depth)
                    .with_mode_perm(perm.clone());
                let bundle = Csf::build(&tt, &opts).unwrap();
                let csf = bundle.rep(0);
                assert_eq!(csf.nnz(), tt.nnz());
                assert_eq!(gold, entry_multiset(&collect_entries(csf)));
            }
        }
    }

    #[test]
    fn round_trip_all_flavors() {
        let tt = random_coo(&[5, 7, 3], 25, 23);
        let gold = entry_multiset(&original_entries(&tt));
        for alloc in [CsfAlloc::OneMode, CsfAlloc::TwoMode, CsfAlloc::AllMode] {
            let bundle = Csf::build(&tt, &Options::default().with_alloc(alloc)).unwrap();
            for csf in bundle.reps() {
                assert_eq!(gold, entry_multiset(&collect_entries(csf)));
            }
        }
    }

    #[test]
    fn four_mode_round_trip_and_invariants() {
        let tt = random_coo(&[4, 3, 5, 2], 30, 7);
        let gold = entry_multiset(&original_entries(&tt));
        for (tile, depth) in [(TilePolicy::NoTile, 0), (TilePolicy::DenseTile, 2)] {
            let opts = Options::default().with_nthreads(2).with_tiling(tile, depth);
            let bundle = Csf::build(&tt, &opts).unwrap();
            let csf = bundle.rep(0);
            assert_eq!(gold, entry_multiset(&collect_entries(csf)));
            for t in csf.tiles() {
                if t.nnz() > 0 {
                    check_tile(t, 4, csf.dims(), csf.dim_perm());
                }
            }
        }
    }

    #[test]
    fn structural_invariants_hold_under_tiling() {
        let tt = random_coo(&[8, 8, 8], 60, 3);
        let opts = Options::default()
            .with_nthreads(4)
            .with_tiling(TilePolicy::DenseTile, 0);
        let bundle = Csf::build(&tt, &opts).unwrap();
        let csf = bundle.rep(0);
        let mut nnz = 0;
        for t in csf.tiles() {
            if t.nnz() > 0 {
                check_tile(t, 3, csf.dims(), csf.dim_perm());
            }
            nnz += t.nnz();
        }
        // leaf counts across tiles account for every nonzero
        assert_eq!(nnz, tt.nnz());
    }
}
