//! Linear algebra type system for the fusion core
//!
//! Provides compile-time dimension checking and clean type aliases
//! for the orientation filters and the magnetometer sphere fit.

use nalgebra::{SMatrix, SVector, UnitQuaternion, Vector3};

// ===== Physical constants =====
pub const STANDARD_GRAVITY: f64 = 9.81; // m/s²

// ===== Basic geometry =====
pub type Vec3 = Vector3<f64>;

/// Body-to-world rotation, `(w, x, y, z)` with `‖q‖ = 1`.
pub type OrientationQuaternion = UnitQuaternion<f64>;

// ===== Sphere fit (hard-iron) =====
// Unknowns: (bx, by, bz, c) with c = r² − ‖b‖²
pub const SPHERE_FIT_DIM: usize = 4;
pub type SphereFitVec = SVector<f64, SPHERE_FIT_DIM>;
pub type SphereFitMat = SMatrix<f64, SPHERE_FIT_DIM, SPHERE_FIT_DIM>;

// ===== Trajectory variants =====
pub const VARIANT_COUNT: usize = 4; // raw, iron, fused, filtered
pub type VariantPositions = [Vec3; VARIANT_COUNT];
