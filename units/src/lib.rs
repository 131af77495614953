//! Physical quantities used at the edges of the spectral decomposition:
//! configuration files and command-line arguments.
//!
//! Energies (bin thresholds, in the config file) and lengths (thicknesses, on
//! the command line) are read with their units, e.g. `"20 keV"` or `"5 mm"`,
//! and converted to plain `f64`s in keV and cm before they reach any numerical
//! code.

pub mod todo;

pub use uom;
pub use uom::si::Quantity;
pub use uom::si::f64::{Energy, Length};

mod units {
  pub use uom::si::{energy::kiloelectronvolt, length::centimeter};
}
pub use units::{kiloelectronvolt, centimeter};

// Making values from float literals is very long-winded, so provide some
// pithily-named convenience constructors.

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f64) -> $quantity { $quantity::new::<units::$unit>(x) }
  };
}

wrap!(kev Energy kiloelectronvolt);
wrap!(cm  Length       centimeter);

// Reverse direction of the above.
pub fn kev_(x: Energy) -> f64 { x.get::<units::kiloelectronvolt>() }
pub fn cm_ (x: Length) -> f64 { x.get::<units::centimeter>() }

#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    $crate::__float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}

#[doc(hidden)]
pub use float_eq as __float_eq;
