//! Synthetic test object: a large disc containing smaller discs of
//! different attenuation.

use ndarray::{Array2, Axis};

use tomoprox::{Shape, Volume};

/// (centre x, centre y, radius, attenuation) in units of half the slice width
const DISCS: [(f32, f32, f32, f32); 5] = [
    ( 0.00,  0.00, 0.80,  1.0),
    (-0.30,  0.25, 0.20,  1.0),
    ( 0.35,  0.20, 0.15, -0.5),
    ( 0.00, -0.40, 0.25,  0.5),
    ( 0.10,  0.45, 0.08,  2.0),
];

/// The same slice repeated along the first axis.
pub fn discs(shape: Shape) -> Volume {
    let [slices, rows, cols] = shape;
    let half = rows.min(cols) as f32 / 2.0;
    let slice = Array2::from_shape_fn((rows, cols), |(r, c)| {
        let y = (r as f32 + 0.5 - rows as f32 / 2.0) / half;
        let x = (c as f32 + 0.5 - cols as f32 / 2.0) / half;
        DISCS.iter()
            .filter(|&&(cx, cy, radius, _)| (x - cx).powi(2) + (y - cy).powi(2) <= radius * radius)
            .map(|&(.., value)| value)
            .sum::<f32>()
    });
    let mut volume = Volume::zeros(shape);
    for mut s in volume.axis_iter_mut(Axis(0)).take(slices) {
        s.assign(&slice);
    }
    volume
}
