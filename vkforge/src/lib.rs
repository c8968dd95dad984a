// Copyright (c) 2024 The vkforge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Owned GPU memory allocations and indexed render pass construction on top of Vulkan.
//!
//! # Overview
//!
//! This crate sits directly above the raw Vulkan API (through [`ash`]) and covers two pieces of
//! resource setup that carry driver-mandated invariants:
//!
//! - A [`ResourceAllocation`](crate::memory::ResourceAllocation) owns exactly one buffer or image
//!   together with the memory allocation bound to it. It knows when mapping the memory requires
//!   explicit cache maintenance (flush or invalidate), and it releases the resource and the
//!   allocation exactly once.
//!
//! - A [`RenderPass`](crate::render_pass::RenderPass) is built from a list of
//!   [`Attachment`](crate::render_pass::Attachment)s that declare how they are used in each
//!   subpass. The builder classifies every attachment reference into its role (input, color,
//!   depth/stencil, resolve or preserve), validates the structure, synthesizes subpass
//!   dependencies, and creates the native handle. The resulting object answers role and
//!   indexed-lookup queries.
//!
//! Neither part talks to a driver directly. Memory goes through the
//! [`MemoryAllocator`](crate::memory::MemoryAllocator) trait, and render passes are realized
//! through the [`RenderPassDevice`](crate::render_pass::RenderPassDevice) trait, which is
//! implemented for [`ash::Device`]. With the `vma` feature, `MemoryAllocator` is implemented for
//! the Vulkan Memory Allocator.
//!
//! Everything here is meant to be called synchronously from the thread that sets up resources.
//! No internal locking is performed.

pub use ash;
use std::{error::Error, fmt};

pub mod format;
pub mod memory;
#[macro_use]
pub mod render_pass;

/// Represents memory size and offset values on a Vulkan device.
/// Analogous to the Rust `usize` type on the host.
pub use ash::vk::DeviceSize;

/// Gives access to the internal identifier of an object.
pub unsafe trait VulkanObject {
    /// The type of the object.
    type Handle: ash::vk::Handle;

    /// Returns the raw Vulkan handle of the object.
    fn handle(&self) -> Self::Handle;
}

/// Error type returned when the host or the device runs out of memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OomError {
    /// There is no memory available on the host (ie. the CPU, RAM, etc.).
    OutOfHostMemory,
    /// There is no memory available on the device (ie. video memory).
    OutOfDeviceMemory,
}

impl Error for OomError {}

impl fmt::Display for OomError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match *self {
                OomError::OutOfHostMemory => "no memory available on the host",
                OomError::OutOfDeviceMemory => "no memory available on the graphical device",
            }
        )
    }
}

impl From<VulkanError> for OomError {
    #[inline]
    fn from(err: VulkanError) -> OomError {
        match err {
            VulkanError::OutOfHostMemory => OomError::OutOfHostMemory,
            VulkanError::OutOfDeviceMemory => OomError::OutOfDeviceMemory,
            _ => panic!("unexpected error: {:?}", err),
        }
    }
}

/// An error code returned by the Vulkan implementation or by the memory allocator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VulkanError {
    OutOfHostMemory,
    OutOfDeviceMemory,
    InitializationFailed,
    DeviceLost,
    MemoryMapFailed,
    FeatureNotPresent,
    TooManyObjects,
    FormatNotSupported,
    FragmentedPool,
    OutOfPoolMemory,
    Unknown,
    /// A result code that has no dedicated variant.
    Unnamed(ash::vk::Result),
}

impl VulkanError {
    /// Returns whether the error signals memory exhaustion.
    #[inline]
    pub fn is_oom(&self) -> bool {
        matches!(self, Self::OutOfHostMemory | Self::OutOfDeviceMemory)
    }
}

impl From<ash::vk::Result> for VulkanError {
    fn from(val: ash::vk::Result) -> Self {
        match val {
            ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY => Self::OutOfHostMemory,
            ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfDeviceMemory,
            ash::vk::Result::ERROR_INITIALIZATION_FAILED => Self::InitializationFailed,
            ash::vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            ash::vk::Result::ERROR_MEMORY_MAP_FAILED => Self::MemoryMapFailed,
            ash::vk::Result::ERROR_FEATURE_NOT_PRESENT => Self::FeatureNotPresent,
            ash::vk::Result::ERROR_TOO_MANY_OBJECTS => Self::TooManyObjects,
            ash::vk::Result::ERROR_FORMAT_NOT_SUPPORTED => Self::FormatNotSupported,
            ash::vk::Result::ERROR_FRAGMENTED_POOL => Self::FragmentedPool,
            ash::vk::Result::ERROR_OUT_OF_POOL_MEMORY => Self::OutOfPoolMemory,
            ash::vk::Result::ERROR_UNKNOWN => Self::Unknown,
            other => Self::Unnamed(other),
        }
    }
}

impl Error for VulkanError {}

impl fmt::Display for VulkanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VulkanError::OutOfHostMemory => write!(f, "a host memory allocation has failed"),
            VulkanError::OutOfDeviceMemory => write!(f, "a device memory allocation has failed"),
            VulkanError::InitializationFailed => write!(
                f,
                "initialization of an object could not be completed for implementation-specific \
                reasons",
            ),
            VulkanError::DeviceLost => write!(f, "the logical or physical device has been lost"),
            VulkanError::MemoryMapFailed => write!(f, "mapping of a memory object has failed"),
            VulkanError::FeatureNotPresent => write!(f, "a requested feature is not supported"),
            VulkanError::TooManyObjects => write!(
                f,
                "too many objects of the type have already been created",
            ),
            VulkanError::FormatNotSupported => write!(
                f,
                "a requested format is not supported on this device",
            ),
            VulkanError::FragmentedPool => write!(
                f,
                "a pool allocation has failed due to fragmentation of the pool's memory",
            ),
            VulkanError::OutOfPoolMemory => write!(f, "a pool memory allocation has failed"),
            VulkanError::Unknown => write!(
                f,
                "an unknown error has occurred; either the application has provided invalid \
                input, or an implementation failure has occurred",
            ),
            VulkanError::Unnamed(result) => {
                write!(f, "unnamed error, VkResult value {}", result.as_raw())
            }
        }
    }
}

/// A helper type for non-exhaustive structs.
///
/// This type cannot be constructed outside vkforge. Structures with a field of this type can only
/// be constructed by calling a constructor function or `Default::default()`. The effect is similar
/// to the standard Rust `#[non_exhaustive]` attribute, except that it does not prevent update
/// syntax from being used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)] // add traits as needed
pub struct NonExhaustive(pub(crate) ());
