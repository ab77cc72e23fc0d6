//! sRGB <-> CIE L*a*b* (D65).
//!
//! Host mirror of the conversion the device program performs, used for the
//! output stage and as a reference in tests.
//!
//! # Formula
//!
//! ```text
//! linear = srgb_eotf(rgb)
//! XYZ    = M_srgb * linear
//! f(t)   = t^(1/3)                  if t > (6/29)^3
//!          t / (3 (6/29)^2) + 4/29  otherwise
//! L = 116 f(Y/Yn) - 16
//! a = 500 (f(X/Xn) - f(Y/Yn))
//! b = 200 (f(Y/Yn) - f(Z/Zn))
//! ```

use rayon::prelude::*;

/// D65 reference white (XYZ, Y = 1).
pub const D65_WHITE: [f32; 3] = [0.95047, 1.0, 1.08883];

const SRGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

const XYZ_TO_SRGB: [[f32; 3]; 3] = [
    [3.2404542, -1.5371385, -0.4985314],
    [-0.9692660, 1.8760108, 0.0415560],
    [0.0556434, -0.2040259, 1.0572252],
];

const DELTA: f32 = 6.0 / 29.0;

/// sRGB EOTF (IEC 61966-2-1): encoded -> linear.
#[inline]
pub fn srgb_eotf(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB OETF: linear -> encoded.
#[inline]
pub fn srgb_oetf(l: f32) -> f32 {
    if l <= 0.0031308 {
        l * 12.92
    } else {
        1.055 * l.powf(1.0 / 2.4) - 0.055
    }
}

#[inline]
fn mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

#[inline]
fn lab_f(t: f32) -> f32 {
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

#[inline]
fn lab_f_inv(t: f32) -> f32 {
    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

/// Convert one sRGB triplet in [0, 1] to L*a*b*.
#[inline]
pub fn srgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
    let lin = rgb.map(|c| srgb_eotf(c.clamp(0.0, 1.0)));
    let xyz = mul(&SRGB_TO_XYZ, lin);
    let fx = lab_f(xyz[0] / D65_WHITE[0]);
    let fy = lab_f(xyz[1] / D65_WHITE[1]);
    let fz = lab_f(xyz[2] / D65_WHITE[2]);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// Convert one L*a*b* triplet to sRGB, clamped to [0, 1].
#[inline]
pub fn lab_to_srgb(lab: [f32; 3]) -> [f32; 3] {
    let fy = (lab[0] + 16.0) / 116.0;
    let fx = fy + lab[1] / 500.0;
    let fz = fy - lab[2] / 200.0;
    let xyz = [
        D65_WHITE[0] * lab_f_inv(fx),
        D65_WHITE[1] * lab_f_inv(fy),
        D65_WHITE[2] * lab_f_inv(fz),
    ];
    mul(&XYZ_TO_SRGB, xyz).map(|c| srgb_oetf(c.max(0.0)).clamp(0.0, 1.0))
}

/// Interleaved RGBA (0..1) to interleaved LAB + alpha.
pub fn rgba_to_lab(pixels: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0; pixels.len()];
    out.par_chunks_exact_mut(4)
        .zip(pixels.par_chunks_exact(4))
        .for_each(|(dst, src)| {
            let lab = srgb_to_lab([src[0], src[1], src[2]]);
            dst.copy_from_slice(&[lab[0], lab[1], lab[2], src[3]]);
        });
    out
}

/// Interleaved LAB + alpha to interleaved RGBA (0..1).
pub fn lab_to_rgba(pixels: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0; pixels.len()];
    out.par_chunks_exact_mut(4)
        .zip(pixels.par_chunks_exact(4))
        .for_each(|(dst, src)| {
            let rgb = lab_to_srgb([src[0], src[1], src[2]]);
            dst.copy_from_slice(&[rgb[0], rgb[1], rgb[2], src[3].clamp(0.0, 1.0)]);
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn white_and_black() {
        let white = srgb_to_lab([1.0, 1.0, 1.0]);
        assert_abs_diff_eq!(white[0], 100.0, epsilon = 0.01);
        assert_abs_diff_eq!(white[1], 0.0, epsilon = 0.01);
        assert_abs_diff_eq!(white[2], 0.0, epsilon = 0.01);

        let black = srgb_to_lab([0.0, 0.0, 0.0]);
        assert_abs_diff_eq!(black[0], 0.0, epsilon = 1e-4);
    }

    #[test]
    fn mid_gray_lightness() {
        let gray = srgb_to_lab([0.5, 0.5, 0.5]);
        assert_abs_diff_eq!(gray[0], 53.39, epsilon = 0.05);
        assert_abs_diff_eq!(gray[1], 0.0, epsilon = 0.01);
    }

    #[test]
    fn primaries_have_expected_signs() {
        let red = srgb_to_lab([1.0, 0.0, 0.0]);
        assert_abs_diff_eq!(red[0], 53.24, epsilon = 0.05);
        assert!(red[1] > 75.0 && red[2] > 60.0);

        let blue = srgb_to_lab([0.0, 0.0, 1.0]);
        assert!(blue[2] < -100.0);
    }

    #[test]
    fn roundtrip() {
        for rgb in [[0.2, 0.4, 0.6], [0.9, 0.1, 0.3], [0.01, 0.02, 0.03], [0.5, 0.5, 0.5]] {
            let back = lab_to_srgb(srgb_to_lab(rgb));
            for c in 0..3 {
                assert_abs_diff_eq!(back[c], rgb[c], epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn bulk_keeps_alpha() {
        let lab = rgba_to_lab(&[1.0, 1.0, 1.0, 0.25, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(lab.len(), 8);
        assert_eq!(lab[3], 0.25);
        assert_eq!(lab[7], 1.0);
        let rgba = lab_to_rgba(&lab);
        assert_abs_diff_eq!(rgba[0], 1.0, epsilon = 1e-3);
        assert_eq!(rgba[3], 0.25);
    }
}
