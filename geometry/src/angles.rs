use units::{Angle, turn};

/// `n` equally spaced projection angles covering `[0, range)`.
pub fn uniform_angles(n: usize, range: Angle) -> Vec<Angle> {
    let step = range / n as f32;
    (0..n).map(|i| step * i as f32).collect()
}

/// Angular range needed for a complete parallel-beam scan.
pub fn half_turn() -> Angle { turn(0.5) }
