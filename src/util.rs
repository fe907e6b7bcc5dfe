// Shared audio math and SIMD slice helpers.

use num_complex::Complex32;
use wide::f32x8;

#[inline(always)]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

// Load 8 consecutive values starting at `offset`, zero-filling past the end.
#[inline(always)]
pub fn load_f32_simd(data: &[f32], offset: usize) -> f32x8 {
    if data.len() >= offset + 8 {
        f32x8::new(data[offset..offset + 8].try_into().unwrap())
    } else {
        let mut lanes = [0.0; 8];
        lanes[..data.len().saturating_sub(offset)].copy_from_slice(&data[offset.min(data.len())..]);
        f32x8::new(lanes)
    }
}

// Deinterleave up to 8 complex values starting at `offset` into (re, im) lanes.
#[inline(always)]
pub fn load_complex_simd(data: &[Complex32], offset: usize) -> (f32x8, f32x8) {
    let (mut re, mut im) = ([0.0; 8], [0.0; 8]);
    for (i, c) in data[offset.min(data.len())..].iter().take(8).enumerate() {
        re[i] = c.re;
        im[i] = c.im;
    }
    (f32x8::new(re), f32x8::new(im))
}
