/// Quantities which are simply type aliases for `f64` rather than having an
/// implementation as a `uom` `Quantity`.
///
/// These are the values which flow through the per-pixel hot loops: the
/// forward model works on plain numbers held in statically-sized `nalgebra`
/// vectors, so the units are only a hint to the reader.
///
/// + Thicknesses (line integrals) are in whatever length unit the attenuation
///   table was tabulated for; their product must be dimensionless.
///
/// + Counts are expectations, hence real-valued, even though detectors count
///   whole photons.

pub type Thicknessf64   = f64;
pub type Attenuationf64 = f64; // TODO uom PerLength, once the tables carry units
pub type Countsf64      = f64;
pub type Fluxf64        = f64;
