//! Cartesian tile grid: per-mode uniform partitions of the index space and
//! the walker that enumerates one plane of tiles perpendicular to a mode.
//!
//! Tile ids are row-major over the per-mode tile coordinates, last mode
//! fastest. The walker is the primitive the kernels use to hand each layer
//! of tiles along a mode to a single worker, so that within a plane only one
//! worker writes any given output row.

use crate::utils::calculation::div_ceil;

/// Row-major tile id of the given per-mode tile coordinates.
pub fn encode_tile(coords: &[usize], tile_dims: &[usize]) -> usize {
    coords
        .iter()
        .zip(tile_dims)
        .fold(0, |id, (&c, &d)| id * d + c)
}

/// Inverse of [`encode_tile`], written into `coords`.
pub fn decode_tile(mut id: usize, tile_dims: &[usize], coords: &mut [usize]) {
    for (c, &d) in coords.iter_mut().zip(tile_dims).rev() {
        *c = id % d;
        id /= d;
    }
}

/// Uniform chunk length of each mode's partition.
pub fn tile_chunks(dims: &[usize], tile_dims: &[usize]) -> Vec<usize> {
    dims.iter()
        .zip(tile_dims)
        .map(|(&d, &t)| div_ceil(d.max(1), t))
        .collect()
}

/// Next tile after `curr` whose mode-`mode` coordinate equals `layer`, in
/// ascending id order; `None` in starts the walk, `None` out ends it.
pub fn next_tile_in_layer(
    curr: Option<usize>,
    tile_dims: &[usize],
    mode: usize,
    layer: usize,
) -> Option<usize> {
    if layer >= tile_dims[mode] {
        return None;
    }
    let mut coords = vec![0; tile_dims.len()];
    match curr {
        None => {
            coords[mode] = layer;
            Some(encode_tile(&coords, tile_dims))
        }
        Some(id) => {
            decode_tile(id, tile_dims, &mut coords);
            debug_assert_eq!(coords[mode], layer);
            // odometer increment over every axis except the fixed mode
            for m in (0..tile_dims.len()).rev() {
                if m == mode {
                    continue;
                }
                coords[m] += 1;
                if coords[m] < tile_dims[m] {
                    return Some(encode_tile(&coords, tile_dims));
                }
                coords[m] = 0;
            }
            None
        }
    }
}

/// Iterator over one plane of tiles: all ids whose mode-`mode` coordinate
/// equals `layer`.
pub struct TilePlane<'a> {
    tile_dims: &'a [usize],
    mode: usize,
    layer: usize,
    curr: Option<usize>,
    started: bool,
}

impl<'a> TilePlane<'a> {
    pub fn new(tile_dims: &'a [usize], mode: usize, layer: usize) -> Self {
        Self {
            tile_dims,
            mode,
            layer,
            curr: None,
            started: false,
        }
    }
}

impl Iterator for TilePlane<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.started && self.curr.is_none() {
            return None;
        }
        self.started = true;
        self.curr = next_tile_in_layer(self.curr, self.tile_dims, self.mode, self.layer);
        self.curr
    }
}
