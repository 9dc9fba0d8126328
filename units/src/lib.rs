//! Physical quantities used to describe acquisition geometries.
//!
//! Angles and distances go through `uom`, so that degrees, radians and turns
//! cannot be mixed up silently. Values which are just numbers in the
//! reconstruction arrays live in [`todo`].

pub mod todo;

pub use uom;
pub use uom::si::Quantity;
pub use uom::si::f32::{Angle, Length};

mod unit {
  pub use uom::si::{length::millimeter,
                    angle ::{radian, degree, revolution},
  };
}

// Making values from float literals is very long-winded, so provide some
// pithily-named convenience constructors.

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f32) -> $quantity { $quantity::new::<unit::$unit>(x) }
  };
}

wrap!(mm     Length  millimeter);
wrap!(radian Angle       radian);
wrap!(degree Angle       degree);
wrap!(turn   Angle   revolution);

// Reverse direction of the above
pub fn mm_    (x: Length) -> f32 { x.get::<unit::millimeter>() }
pub fn radian_(x: Angle ) -> f32 { x.get::<unit::radian>() }
pub fn degree_(x: Angle ) -> f32 { x.get::<unit::degree>() }

#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}
