// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Element formats for typed buffers.

The numeric values follow the native API's format enumeration, so a [`Format`] can be handed
to the backend unchanged.  Every format has a [`FormatDesc`] describing how an element is laid
out in memory.  Only *simple* formats (one component type repeated a number of times, byte
aligned) can back a typed buffer.
*/

/// Layout description of a [`Format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDesc {
    /// Human-readable name, e.g. `R16G16_Snorm`.
    pub name: &'static str,
    /// Single-component format each component is stored as, or [`Format::Unknown`]
    /// when components are not uniform.
    pub component_format: Format,
    pub bits_per_element: u32,
    pub component_count: u32,
    /// Components that carry data.  Padding components (`X8` and friends) are not active.
    pub active_component_count: u32,
    /// All components share one byte-aligned type.
    pub is_simple: bool,
}

/// How the bits of one component are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Typeless,
    Float,
    Unorm,
    Snorm,
    Uint,
    Sint,
}

macro_rules! formats {
    ($( $variant:ident = $value:literal => ($name:literal, $component:ident, $bits:literal, $count:literal, $active:literal, $simple:literal) ),* $(,)?) => {
        /// Element format of a typed buffer view.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum Format {
            $( $variant = $value, )*
        }

        impl Format {
            /// Every known format, in ascending numeric order.
            pub const ALL: &'static [Format] = &[$( Format::$variant, )*];

            /// Looks up a format by its native numeric value.
            pub fn from_raw(value: u32) -> Option<Format> {
                match value {
                    $( $value => Some(Format::$variant), )*
                    _ => None,
                }
            }

            /// Layout description for this format.
            pub fn desc(self) -> &'static FormatDesc {
                match self {
                    $( Format::$variant => {
                        const DESC: FormatDesc = FormatDesc {
                            name: $name,
                            component_format: Format::$component,
                            bits_per_element: $bits,
                            component_count: $count,
                            active_component_count: $active,
                            is_simple: $simple,
                        };
                        &DESC
                    } )*
                }
            }
        }
    };
}

formats! {
    Unknown = 0 => ("Unknown", Unknown, 0, 0, 0, false),
    R32G32B32A32Typeless = 1 => ("R32G32B32A32_Typeless", R32Typeless, 128, 4, 4, true),
    R32G32B32A32Float = 2 => ("R32G32B32A32_Float", R32Float, 128, 4, 4, true),
    R32G32B32A32Uint = 3 => ("R32G32B32A32_Uint", R32Uint, 128, 4, 4, true),
    R32G32B32A32Sint = 4 => ("R32G32B32A32_Sint", R32Sint, 128, 4, 4, true),
    R32G32B32Typeless = 5 => ("R32G32B32_Typeless", R32Typeless, 96, 3, 3, true),
    R32G32B32Float = 6 => ("R32G32B32_Float", R32Float, 96, 3, 3, true),
    R32G32B32Uint = 7 => ("R32G32B32_Uint", R32Uint, 96, 3, 3, true),
    R32G32B32Sint = 8 => ("R32G32B32_Sint", R32Sint, 96, 3, 3, true),
    R16G16B16A16Typeless = 9 => ("R16G16B16A16_Typeless", R16Typeless, 64, 4, 4, true),
    R16G16B16A16Float = 10 => ("R16G16B16A16_Float", R16Float, 64, 4, 4, true),
    R16G16B16A16Unorm = 11 => ("R16G16B16A16_Unorm", R16Unorm, 64, 4, 4, true),
    R16G16B16A16Uint = 12 => ("R16G16B16A16_Uint", R16Uint, 64, 4, 4, true),
    R16G16B16A16Snorm = 13 => ("R16G16B16A16_Snorm", R16Snorm, 64, 4, 4, true),
    R16G16B16A16Sint = 14 => ("R16G16B16A16_Sint", R16Sint, 64, 4, 4, true),
    R32G32Typeless = 15 => ("R32G32_Typeless", R32Typeless, 64, 2, 2, true),
    R32G32Float = 16 => ("R32G32_Float", R32Float, 64, 2, 2, true),
    R32G32Uint = 17 => ("R32G32_Uint", R32Uint, 64, 2, 2, true),
    R32G32Sint = 18 => ("R32G32_Sint", R32Sint, 64, 2, 2, true),
    R32G8X24Typeless = 19 => ("R32G8X24_Typeless", Unknown, 64, 3, 2, false),
    D32FloatS8X24Uint = 20 => ("D32_Float_S8X24_Uint", Unknown, 64, 3, 2, false),
    R32FloatX8X24Typeless = 21 => ("R32_Float_X8X24_Typeless", Unknown, 64, 3, 1, false),
    X32TypelessG8X24Uint = 22 => ("X32_Typeless_G8X24_Uint", Unknown, 64, 3, 1, false),
    R10G10B10A2Typeless = 23 => ("R10G10B10A2_Typeless", Unknown, 32, 4, 4, false),
    R10G10B10A2Unorm = 24 => ("R10G10B10A2_Unorm", Unknown, 32, 4, 4, false),
    R10G10B10A2Uint = 25 => ("R10G10B10A2_Uint", Unknown, 32, 4, 4, false),
    R11G11B10Float = 26 => ("R11G11B10_Float", Unknown, 32, 3, 3, false),
    R8G8B8A8Typeless = 27 => ("R8G8B8A8_Typeless", R8Typeless, 32, 4, 4, true),
    R8G8B8A8Unorm = 28 => ("R8G8B8A8_Unorm", R8Unorm, 32, 4, 4, true),
    R8G8B8A8UnormSrgb = 29 => ("R8G8B8A8_Unorm_sRGB", R8Unorm, 32, 4, 4, true),
    R8G8B8A8Uint = 30 => ("R8G8B8A8_Uint", R8Uint, 32, 4, 4, true),
    R8G8B8A8Snorm = 31 => ("R8G8B8A8_Snorm", R8Snorm, 32, 4, 4, true),
    R8G8B8A8Sint = 32 => ("R8G8B8A8_Sint", R8Sint, 32, 4, 4, true),
    R16G16Typeless = 33 => ("R16G16_Typeless", R16Typeless, 32, 2, 2, true),
    R16G16Float = 34 => ("R16G16_Float", R16Float, 32, 2, 2, true),
    R16G16Unorm = 35 => ("R16G16_Unorm", R16Unorm, 32, 2, 2, true),
    R16G16Uint = 36 => ("R16G16_Uint", R16Uint, 32, 2, 2, true),
    R16G16Snorm = 37 => ("R16G16_Snorm", R16Snorm, 32, 2, 2, true),
    R16G16Sint = 38 => ("R16G16_Sint", R16Sint, 32, 2, 2, true),
    R32Typeless = 39 => ("R32_Typeless", R32Typeless, 32, 1, 1, true),
    D32Float = 40 => ("D32_Float", R32Float, 32, 1, 1, false),
    R32Float = 41 => ("R32_Float", R32Float, 32, 1, 1, true),
    R32Uint = 42 => ("R32_Uint", R32Uint, 32, 1, 1, true),
    R32Sint = 43 => ("R32_Sint", R32Sint, 32, 1, 1, true),
    R24G8Typeless = 44 => ("R24G8_Typeless", Unknown, 32, 2, 2, false),
    D24UnormS8Uint = 45 => ("D24_Unorm_S8_Uint", Unknown, 32, 2, 2, false),
    R24UnormX8Typeless = 46 => ("R24_Unorm_X8_Typeless", Unknown, 32, 2, 1, false),
    X24TypelessG8Uint = 47 => ("X24_Typeless_G8_Uint", Unknown, 32, 2, 1, false),
    R8G8Typeless = 48 => ("R8G8_Typeless", R8Typeless, 16, 2, 2, true),
    R8G8Unorm = 49 => ("R8G8_Unorm", R8Unorm, 16, 2, 2, true),
    R8G8Uint = 50 => ("R8G8_Uint", R8Uint, 16, 2, 2, true),
    R8G8Snorm = 51 => ("R8G8_Snorm", R8Snorm, 16, 2, 2, true),
    R8G8Sint = 52 => ("R8G8_Sint", R8Sint, 16, 2, 2, true),
    R16Typeless = 53 => ("R16_Typeless", R16Typeless, 16, 1, 1, true),
    R16Float = 54 => ("R16_Float", R16Float, 16, 1, 1, true),
    D16Unorm = 55 => ("D16_Unorm", D16Unorm, 16, 1, 1, false),
    R16Unorm = 56 => ("R16_Unorm", R16Unorm, 16, 1, 1, true),
    R16Uint = 57 => ("R16_Uint", R16Uint, 16, 1, 1, true),
    R16Snorm = 58 => ("R16_Snorm", R16Snorm, 16, 1, 1, true),
    R16Sint = 59 => ("R16_Sint", R16Sint, 16, 1, 1, true),
    R8Typeless = 60 => ("R8_Typeless", R8Typeless, 8, 1, 1, true),
    R8Unorm = 61 => ("R8_Unorm", R8Unorm, 8, 1, 1, true),
    R8Uint = 62 => ("R8_Uint", R8Uint, 8, 1, 1, true),
    R8Snorm = 63 => ("R8_Snorm", R8Snorm, 8, 1, 1, true),
    R8Sint = 64 => ("R8_Sint", R8Sint, 8, 1, 1, true),
    A8Unorm = 65 => ("A8_Unorm", R8Unorm, 8, 1, 1, false),
    R1Unorm = 66 => ("R1_Unorm", Unknown, 1, 1, 1, false),
    R9G9B9E5SharedExp = 67 => ("R9G9B9E5_SharedExp", Unknown, 32, 3, 3, false),
    R8G8B8G8Unorm = 68 => ("R8G8_B8G8_Unorm", Unknown, 32, 4, 4, false),
    G8R8G8B8Unorm = 69 => ("G8R8_G8B8_Unorm", Unknown, 32, 4, 4, false),
    Bc1Typeless = 70 => ("BC1_Typeless", Unknown, 4, 4, 4, false),
    Bc1Unorm = 71 => ("BC1_Unorm", Unknown, 4, 4, 4, false),
    Bc1UnormSrgb = 72 => ("BC1_Unorm_sRGB", Unknown, 4, 4, 4, false),
    Bc2Typeless = 73 => ("BC2_Typeless", Unknown, 8, 4, 4, false),
    Bc2Unorm = 74 => ("BC2_Unorm", Unknown, 8, 4, 4, false),
    Bc2UnormSrgb = 75 => ("BC2_Unorm_sRGB", Unknown, 8, 4, 4, false),
    Bc3Typeless = 76 => ("BC3_Typeless", Unknown, 8, 4, 4, false),
    Bc3Unorm = 77 => ("BC3_Unorm", Unknown, 8, 4, 4, false),
    Bc3UnormSrgb = 78 => ("BC3_Unorm_sRGB", Unknown, 8, 4, 4, false),
    Bc4Typeless = 79 => ("BC4_Typeless", Unknown, 4, 1, 1, false),
    Bc4Unorm = 80 => ("BC4_Unorm", Unknown, 4, 1, 1, false),
    Bc4Snorm = 81 => ("BC4_Snorm", Unknown, 4, 1, 1, false),
    Bc5Typeless = 82 => ("BC5_Typeless", Unknown, 8, 2, 2, false),
    Bc5Unorm = 83 => ("BC5_Unorm", Unknown, 8, 2, 2, false),
    Bc5Snorm = 84 => ("BC5_Snorm", Unknown, 8, 2, 2, false),
    B5G6R5Unorm = 85 => ("B5G6R5_Unorm", Unknown, 16, 3, 3, false),
    B5G5R5A1Unorm = 86 => ("B5G5R5A1_Unorm", Unknown, 16, 4, 4, false),
    B8G8R8A8Unorm = 87 => ("B8G8R8A8_Unorm", R8Unorm, 32, 4, 4, false),
    B8G8R8X8Unorm = 88 => ("B8G8R8X8_Unorm", R8Unorm, 32, 4, 3, false),
    R10G10B10XrBiasA2Unorm = 89 => ("R10G10B10_XR_Bias_A2_Unorm", Unknown, 32, 4, 4, false),
    B8G8R8A8Typeless = 90 => ("B8G8R8A8_Typeless", R8Typeless, 32, 4, 4, false),
    B8G8R8A8UnormSrgb = 91 => ("B8G8R8A8_Unorm_sRGB", R8Unorm, 32, 4, 4, false),
    B8G8R8X8Typeless = 92 => ("B8G8R8X8_Typeless", R8Typeless, 32, 4, 3, false),
    B8G8R8X8UnormSrgb = 93 => ("B8G8R8X8_Unorm_sRGB", R8Unorm, 32, 4, 3, false),
    Bc6HTypeless = 94 => ("BC6H_Typeless", Unknown, 8, 3, 3, false),
    Bc6HUf16 = 95 => ("BC6H_UF16", Unknown, 8, 3, 3, false),
    Bc6HSf16 = 96 => ("BC6H_SF16", Unknown, 8, 3, 3, false),
    Bc7Typeless = 97 => ("BC7_Typeless", Unknown, 8, 4, 4, false),
    Bc7Unorm = 98 => ("BC7_Unorm", Unknown, 8, 4, 4, false),
    Bc7UnormSrgb = 99 => ("BC7_Unorm_sRGB", Unknown, 8, 4, 4, false),
    B4G4R4A4Unorm = 115 => ("B4G4R4A4_Unorm", Unknown, 16, 4, 4, false),
    A4B4G4R4Unorm = 191 => ("A4B4G4R4_Unorm", Unknown, 16, 4, 4, false),
}

impl Default for Format {
    fn default() -> Self {
        Format::Unknown
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.desc().name)
    }
}

impl Format {
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Size of one element in bytes, or 0 for block-compressed and sub-byte formats.
    pub fn element_size(self) -> usize {
        let bits = self.desc().bits_per_element;
        if bits % 8 == 0 { (bits / 8) as usize } else { 0 }
    }

    /// Whether a typed buffer may use this format.
    pub fn is_buffer_compatible(self) -> bool {
        let desc = self.desc();
        desc.is_simple && desc.bits_per_element > 0 && desc.bits_per_element % 8 == 0
    }

    /// Interpretation of one component.  Only meaningful for simple formats.
    pub fn component_kind(self) -> Option<ComponentKind> {
        use Format::*;
        match self.desc().component_format {
            R32Typeless | R16Typeless | R8Typeless => Some(ComponentKind::Typeless),
            R32Float | R16Float => Some(ComponentKind::Float),
            R16Unorm | R8Unorm | D16Unorm => Some(ComponentKind::Unorm),
            R16Snorm | R8Snorm => Some(ComponentKind::Snorm),
            R32Uint | R16Uint | R8Uint => Some(ComponentKind::Uint),
            R32Sint | R16Sint | R8Sint => Some(ComponentKind::Sint),
            _ => None,
        }
    }

    /// Width of one component in bits.  Only meaningful for simple formats.
    pub fn component_bits(self) -> u32 {
        let desc = self.desc();
        if desc.component_count == 0 {
            0
        } else {
            desc.bits_per_element / desc.component_count
        }
    }
}

fn component_mask(bits: u32) -> u32 {
    if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 }
}

/// Largest positive value of a signed component.
fn signed_max(bits: u32) -> u32 {
    component_mask(bits) >> 1
}

/// Converts four clear values into per-component storage bits for `format`.
///
/// All-zero is accepted for every format.  Otherwise unsigned components take values up to
/// their maximum, signed components take non-negative values up to their positive maximum,
/// and 32-bit float components reinterpret the bits.  Any other format is rejected.
pub(crate) fn uint_clear_bits(format: Format, values: [u32; 4]) -> Result<[u32; 4], &'static str> {
    if values == [0; 4] {
        return Ok(values);
    }
    let count = format.desc().component_count as usize;
    let bits = format.component_bits();
    let active = &values[..count.min(4)];
    match format.component_kind() {
        Some(ComponentKind::Uint) => {
            if active.iter().all(|v| *v <= component_mask(bits)) {
                Ok(values)
            } else {
                Err("clear value does not fit unsigned component")
            }
        }
        Some(ComponentKind::Sint) => {
            if active.iter().all(|v| *v <= signed_max(bits)) {
                Ok(values)
            } else {
                Err("clear value must be a non-negative signed component")
            }
        }
        Some(ComponentKind::Float) if bits == 32 => Ok(values),
        _ => Err("format does not accept non-zero integer clear values"),
    }
}

/// Converts four float clear values into per-component storage bits for `format`.
pub(crate) fn float_clear_bits(format: Format, values: [f32; 4]) -> Result<[u32; 4], &'static str> {
    let bits = format.component_bits();
    let kind = format.component_kind();
    match kind {
        Some(ComponentKind::Float | ComponentKind::Unorm | ComponentKind::Snorm) => {
            Ok(values.map(|v| encode_float(format, v)))
        }
        _ if bits == 0 => Err("format has no components"),
        _ => Err("format does not accept float clear values"),
    }
}

/// Encodes `value` into the storage bits of one component of `format`.
pub(crate) fn encode_float(format: Format, value: f32) -> u32 {
    let bits = format.component_bits();
    match format.component_kind() {
        Some(ComponentKind::Float) if bits == 16 => half::f16::from_f32(value).to_bits() as u32,
        Some(ComponentKind::Float) => value.to_bits(),
        Some(ComponentKind::Unorm) => {
            let max = component_mask(bits) as f32;
            (crate::bittricks::saturate(value) * max).round() as u32
        }
        Some(ComponentKind::Snorm) => {
            let max = signed_max(bits) as f32;
            let scaled = (crate::bittricks::clamp(value, -1.0, 1.0) * max).round() as i32;
            (scaled as u32) & component_mask(bits)
        }
        Some(ComponentKind::Sint) => (value as i32 as u32) & component_mask(bits),
        Some(ComponentKind::Uint) | Some(ComponentKind::Typeless) | None => {
            (value.max(0.0) as u32) & component_mask(bits)
        }
    }
}

/// Decodes the storage bits of one component of `format` into a float.
pub(crate) fn decode_float(format: Format, stored: u32) -> f32 {
    let bits = format.component_bits();
    match format.component_kind() {
        Some(ComponentKind::Float) if bits == 16 => half::f16::from_bits(stored as u16).to_f32(),
        Some(ComponentKind::Float) => f32::from_bits(stored),
        Some(ComponentKind::Unorm) => stored as f32 / component_mask(bits) as f32,
        Some(ComponentKind::Snorm) => {
            let value = sign_extend(stored, bits) as f32 / signed_max(bits) as f32;
            value.max(-1.0)
        }
        Some(ComponentKind::Sint) => sign_extend(stored, bits) as f32,
        Some(ComponentKind::Uint) | Some(ComponentKind::Typeless) | None => stored as f32,
    }
}

fn sign_extend(stored: u32, bits: u32) -> i32 {
    if bits >= 32 || bits == 0 {
        stored as i32
    } else {
        let shift = 32 - bits;
        ((stored << shift) as i32) >> shift
    }
}

/// Writes the first `component_count` entries of `components` into one element.
///
/// `out` must be exactly one element long.
pub(crate) fn pack_element(format: Format, components: [u32; 4], out: &mut [u8]) {
    let component_bytes = (format.component_bits() / 8) as usize;
    if component_bytes == 0 {
        return;
    }
    for (chunk, value) in out.chunks_exact_mut(component_bytes).zip(components) {
        let bytes = value.to_le_bytes();
        chunk.copy_from_slice(&bytes[..component_bytes]);
    }
}

/// Reads every component of one element, zero-extended.
pub(crate) fn unpack_element(format: Format, element: &[u8]) -> [u32; 4] {
    let component_bytes = (format.component_bits() / 8) as usize;
    let mut components = [0u32; 4];
    if component_bytes == 0 {
        return components;
    }
    for (value, chunk) in components.iter_mut().zip(element.chunks_exact(component_bytes)) {
        let mut bytes = [0u8; 4];
        bytes[..component_bytes].copy_from_slice(chunk);
        *value = u32::from_le_bytes(bytes);
    }
    components
}
