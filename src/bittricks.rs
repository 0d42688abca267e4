// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
bit and arithmetic helpers shared by validation, clears and kernels.
*/

pub fn divide_rounding_up(numerator: u32, denominator: u32) -> u32 {
    numerator.div_ceil(denominator)
}

pub fn divide_rounding_up3(numerator: [u32; 3], denominator: [u32; 3]) -> [u32; 3] {
    [
        divide_rounding_up(numerator[0], denominator[0]),
        divide_rounding_up(numerator[1], denominator[1]),
        divide_rounding_up(numerator[2], denominator[2]),
    ]
}

pub fn count_bits_set(value: u32) -> u32 {
    value.count_ones()
}

pub fn is_multiple(value: usize, of: usize) -> bool {
    of != 0 && value % of == 0
}

pub fn is_pow2(value: usize) -> bool {
    value.is_power_of_two()
}

/// Rounds `value` up to a multiple of the power of two `alignment`.
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(is_pow2(alignment));
    (value + alignment - 1) & !(alignment - 1)
}

pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    value.max(min).min(max)
}

pub fn saturate(value: f32) -> f32 {
    clamp(value, 0.0, 1.0)
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

///Reinterprets float bits as an integer.
pub fn asuint(value: f32) -> u32 {
    value.to_bits()
}

pub fn asfloat(value: u32) -> f32 {
    f32::from_bits(value)
}

pub fn asuint_array<const N: usize>(values: [f32; N]) -> [u32; N] {
    values.map(asuint)
}
