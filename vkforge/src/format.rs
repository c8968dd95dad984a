// Copyright (c) 2024 The vkforge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Clear values and the few format properties the render pass builder needs.
//!
//! Formats themselves are plain [`ash::vk::Format`] values. This module only answers the
//! questions that affect how an attachment is referenced and cleared: which aspects a format has,
//! and whether its components are floating-point, signed or unsigned integers.

use ash::vk;

/// Returns the image aspects that are present in `format`.
///
/// Depth and stencil formats report `DEPTH`, `STENCIL` or both. Every other format reports
/// `COLOR`.
pub fn format_aspects(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Returns whether `format` has a depth or a stencil aspect.
#[inline]
pub fn is_depth_stencil_format(format: vk::Format) -> bool {
    format_aspects(format).intersects(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL)
}

/// The numeric type of the components of a color format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumericType {
    /// Floating-point, including `UNORM`, `SNORM`, `SRGB` and `SFLOAT`.
    Float,
    /// Signed integer.
    Sint,
    /// Unsigned integer.
    Uint,
}

impl NumericType {
    /// Returns the numeric type of the color components of `format`.
    pub fn of_color_format(format: vk::Format) -> NumericType {
        match format {
            vk::Format::R8_UINT
            | vk::Format::R8G8_UINT
            | vk::Format::R8G8B8_UINT
            | vk::Format::B8G8R8_UINT
            | vk::Format::R8G8B8A8_UINT
            | vk::Format::B8G8R8A8_UINT
            | vk::Format::A8B8G8R8_UINT_PACK32
            | vk::Format::A2R10G10B10_UINT_PACK32
            | vk::Format::A2B10G10R10_UINT_PACK32
            | vk::Format::R16_UINT
            | vk::Format::R16G16_UINT
            | vk::Format::R16G16B16_UINT
            | vk::Format::R16G16B16A16_UINT
            | vk::Format::R32_UINT
            | vk::Format::R32G32_UINT
            | vk::Format::R32G32B32_UINT
            | vk::Format::R32G32B32A32_UINT
            | vk::Format::R64_UINT
            | vk::Format::R64G64_UINT
            | vk::Format::R64G64B64_UINT
            | vk::Format::R64G64B64A64_UINT => NumericType::Uint,
            vk::Format::R8_SINT
            | vk::Format::R8G8_SINT
            | vk::Format::R8G8B8_SINT
            | vk::Format::B8G8R8_SINT
            | vk::Format::R8G8B8A8_SINT
            | vk::Format::B8G8R8A8_SINT
            | vk::Format::A8B8G8R8_SINT_PACK32
            | vk::Format::A2R10G10B10_SINT_PACK32
            | vk::Format::A2B10G10R10_SINT_PACK32
            | vk::Format::R16_SINT
            | vk::Format::R16G16_SINT
            | vk::Format::R16G16B16_SINT
            | vk::Format::R16G16B16A16_SINT
            | vk::Format::R32_SINT
            | vk::Format::R32G32_SINT
            | vk::Format::R32G32B32_SINT
            | vk::Format::R32G32B32A32_SINT
            | vk::Format::R64_SINT
            | vk::Format::R64G64_SINT
            | vk::Format::R64G64B64_SINT
            | vk::Format::R64G64B64A64_SINT => NumericType::Sint,
            _ => NumericType::Float,
        }
    }
}

/// Describes a uniform value that will be used to fill an attachment when it is cleared.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ClearValue {
    /// Value for floating-point attachments, including `UNORM`, `SNORM`, `SFLOAT`.
    Float([f32; 4]),
    /// Value for integer attachments, including `SINT`.
    Int([i32; 4]),
    /// Value for unsigned integer attachments, including `UINT`.
    Uint([u32; 4]),
    /// Value for depth attachments.
    Depth(f32),
    /// Value for stencil attachments.
    Stencil(u32),
    /// Value for depth and stencil attachments.
    DepthStencil((f32, u32)),
}

impl ClearValue {
    /// Returns the clear value used for an attachment of `format` when none was given.
    ///
    /// Depth is cleared to the far plane (`1.0`), stencil to `0`, and color to transparent
    /// black of the matching numeric type.
    pub fn default_for_format(format: vk::Format) -> ClearValue {
        let aspects = format_aspects(format);

        if aspects.contains(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL) {
            ClearValue::DepthStencil((1.0, 0))
        } else if aspects.contains(vk::ImageAspectFlags::DEPTH) {
            ClearValue::Depth(1.0)
        } else if aspects.contains(vk::ImageAspectFlags::STENCIL) {
            ClearValue::Stencil(0)
        } else {
            match NumericType::of_color_format(format) {
                NumericType::Float => ClearValue::Float([0.0; 4]),
                NumericType::Sint => ClearValue::Int([0; 4]),
                NumericType::Uint => ClearValue::Uint([0; 4]),
            }
        }
    }
}

impl From<[f32; 4]> for ClearValue {
    #[inline]
    fn from(val: [f32; 4]) -> ClearValue {
        ClearValue::Float(val)
    }
}

impl From<[u32; 4]> for ClearValue {
    #[inline]
    fn from(val: [u32; 4]) -> ClearValue {
        ClearValue::Uint(val)
    }
}

impl From<[i32; 4]> for ClearValue {
    #[inline]
    fn from(val: [i32; 4]) -> ClearValue {
        ClearValue::Int(val)
    }
}

impl From<f32> for ClearValue {
    #[inline]
    fn from(val: f32) -> ClearValue {
        ClearValue::Depth(val)
    }
}

impl From<(f32, u32)> for ClearValue {
    #[inline]
    fn from(val: (f32, u32)) -> ClearValue {
        ClearValue::DepthStencil(val)
    }
}

impl From<ClearValue> for vk::ClearValue {
    fn from(val: ClearValue) -> Self {
        match val {
            ClearValue::Float(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            ClearValue::Int(int32) => vk::ClearValue {
                color: vk::ClearColorValue { int32 },
            },
            ClearValue::Uint(uint32) => vk::ClearValue {
                color: vk::ClearColorValue { uint32 },
            },
            ClearValue::Depth(depth) => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
            },
            ClearValue::Stencil(stencil) => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 0.0,
                    stencil,
                },
            },
            ClearValue::DepthStencil((depth, stencil)) => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}
