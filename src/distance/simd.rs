//! SIMD-optimized distance kernels with cached runtime dispatch.
//!
//! Supported instruction sets, detected once at first use:
//! - **AVX2+FMA** (x86_64): 8 floats per iteration
//! - **NEON** (aarch64): 4 floats per iteration
//! - **Scalar**: fallback for all platforms
//!
//! Dispatch is resolved a single time into a process-wide table of function
//! pointers ([`Kernels`]); after that every call is a plain indirect call
//! with no feature probing on the hot path. Remainder lanes always fall
//! back to scalar arithmetic.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

use super::scalar;
use std::sync::OnceLock;

/// SIMD capability level detected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdLevel {
    /// AVX2 + FMA available (x86_64 only).
    Avx2,
    /// NEON available (aarch64, always true).
    Neon,
    /// Scalar fallback.
    Scalar,
}

/// Resolved distance kernels for the running CPU.
///
/// Obtained via [`kernels`]; the function pointers never change after the
/// first call.
pub struct Kernels {
    /// The detected capability level.
    pub level: SimdLevel,
    /// Squared Euclidean distance.
    pub euclidean_sq: fn(&[f32], &[f32]) -> f32,
    /// Dot product.
    pub dot: fn(&[f32], &[f32]) -> f32,
    /// Cosine distance (`1 - dot`); assumes unit-normalized inputs.
    pub cosine: fn(&[f32], &[f32]) -> f32,
    /// One query against `n` contiguous rows; writes `n` squared distances.
    pub batch_euclidean_sq: fn(&[f32], &[f32], usize, &mut [f32]),
}

static KERNELS: OnceLock<Kernels> = OnceLock::new();

fn detect() -> Kernels {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return Kernels {
                level: SimdLevel::Avx2,
                euclidean_sq: euclidean_distance_squared_avx2_safe,
                dot: dot_product_avx2_safe,
                cosine: cosine_distance_avx2_safe,
                batch_euclidean_sq: super::batch::batch_euclidean_distance_squared,
            };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return Kernels {
            level: SimdLevel::Neon,
            euclidean_sq: euclidean_distance_squared_neon,
            dot: dot_product_neon,
            cosine: cosine_distance_neon,
            batch_euclidean_sq: super::batch::batch_euclidean_distance_squared,
        };
    }

    #[allow(unreachable_code)]
    Kernels {
        level: SimdLevel::Scalar,
        euclidean_sq: scalar::euclidean_distance_squared,
        dot: scalar::dot_product,
        cosine: scalar::cosine_distance,
        batch_euclidean_sq: scalar::batch_euclidean_distance_squared,
    }
}

/// Return the cached kernel table, detecting CPU features on first use.
#[inline]
pub fn kernels() -> &'static Kernels {
    KERNELS.get_or_init(detect)
}

/// Human-readable name of the selected instruction set.
pub fn isa_name() -> &'static str {
    match kernels().level {
        SimdLevel::Avx2 => "AVX2",
        SimdLevel::Neon => "NEON",
        SimdLevel::Scalar => "Scalar",
    }
}

/// Squared Euclidean distance through the cached dispatch table.
#[inline]
pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    (kernels().euclidean_sq)(a, b)
}

/// Dot product through the cached dispatch table.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    (kernels().dot)(a, b)
}

/// Cosine distance (`1 - dot`) through the cached dispatch table.
///
/// Inputs are assumed unit-normalized; nothing is normalized here.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (kernels().cosine)(a, b)
}

// =============================================================================
// AVX2+FMA implementations (x86_64)
// =============================================================================

/// Compute squared Euclidean distance using AVX2 and FMA intrinsics.
///
/// Processes 8 floats per iteration; the remainder is handled with scalar
/// arithmetic.
///
/// # Safety
/// - Requires AVX2 and FMA CPU features to be available.
/// - The caller must ensure the CPU supports these features before calling.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
pub unsafe fn euclidean_distance_squared_avx2(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len();
    let mut sum = _mm256_setzero_ps();
    let mut i = 0;

    while i + 8 <= len {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        let diff = _mm256_sub_ps(va, vb);
        sum = _mm256_fmadd_ps(diff, diff, sum);
        i += 8;
    }

    // Horizontal sum of the 8 lanes
    let sum_array: [f32; 8] = std::mem::transmute(sum);
    let mut total: f32 = sum_array.iter().sum();

    while i < len {
        let diff = a[i] - b[i];
        total += diff * diff;
        i += 1;
    }

    total
}

/// Compute dot product using AVX2 and FMA intrinsics.
///
/// # Safety
/// - Requires AVX2 and FMA CPU features to be available.
/// - The caller must ensure the CPU supports these features before calling.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
pub unsafe fn dot_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len();
    let mut sum = _mm256_setzero_ps();
    let mut i = 0;

    while i + 8 <= len {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        sum = _mm256_fmadd_ps(va, vb, sum);
        i += 8;
    }

    let sum_array: [f32; 8] = std::mem::transmute(sum);
    let mut total: f32 = sum_array.iter().sum();

    while i < len {
        total += a[i] * b[i];
        i += 1;
    }

    total
}

// Safe wrappers with fn-pointer-compatible signatures. The dispatch table
// only installs these after feature detection has succeeded.

#[cfg(target_arch = "x86_64")]
fn euclidean_distance_squared_avx2_safe(a: &[f32], b: &[f32]) -> f32 {
    // SAFETY: installed into the kernel table only when AVX2+FMA were detected.
    unsafe { euclidean_distance_squared_avx2(a, b) }
}

#[cfg(target_arch = "x86_64")]
fn dot_product_avx2_safe(a: &[f32], b: &[f32]) -> f32 {
    // SAFETY: installed into the kernel table only when AVX2+FMA were detected.
    unsafe { dot_product_avx2(a, b) }
}

#[cfg(target_arch = "x86_64")]
fn cosine_distance_avx2_safe(a: &[f32], b: &[f32]) -> f32 {
    1.0 - dot_product_avx2_safe(a, b)
}

// =============================================================================
// ARM NEON implementations (aarch64)
// =============================================================================
// NEON is always available on aarch64, so no runtime detection is needed.

/// Compute squared Euclidean distance using NEON intrinsics.
///
/// Processes 4 floats per iteration using 128-bit registers.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn euclidean_distance_squared_neon(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len();
    let mut i = 0;
    let mut sum = unsafe { vdupq_n_f32(0.0) };

    while i + 4 <= len {
        unsafe {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            let diff = vsubq_f32(va, vb);
            sum = vfmaq_f32(sum, diff, diff);
        }
        i += 4;
    }

    let mut total = unsafe { vaddvq_f32(sum) };

    while i < len {
        let diff = a[i] - b[i];
        total += diff * diff;
        i += 1;
    }

    total
}

/// Compute dot product using NEON intrinsics.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn dot_product_neon(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len();
    let mut i = 0;
    let mut sum = unsafe { vdupq_n_f32(0.0) };

    while i + 4 <= len {
        unsafe {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            sum = vfmaq_f32(sum, va, vb);
        }
        i += 4;
    }

    let mut total = unsafe { vaddvq_f32(sum) };

    while i < len {
        total += a[i] * b[i];
        i += 1;
    }

    total
}

#[cfg(target_arch = "aarch64")]
fn cosine_distance_neon(a: &[f32], b: &[f32]) -> f32 {
    1.0 - dot_product_neon(a, b)
}
