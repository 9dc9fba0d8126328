/// Quantities which are simply type aliases for `f32` rather than having an
/// implementation as a `uom` `Quantity`.
///
/// Sinogram values are line integrals of attenuation (dimensionless after
/// flat/dark normalization and log transform), and statistical weights are
/// inverse variances of those, so neither maps onto a `uom` dimension we
/// would gain anything from. The aliases still give clues in the source as to
/// what a given `f32` represents.

pub type Intensityf32   = f32;
pub type Weightf32      = f32;
pub type Attenuationf32 = f32; // reconstructed voxel value
