// Copyright (c) 2024 The vkforge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The interface to the memory allocator that allocations are drawn from.

use crate::{DeviceSize, NonExhaustive, VulkanError};
use ash::vk;
use std::{fmt, ptr::NonNull, sync::Arc};

/// General-purpose memory allocator that creates buffers and images together with the memory
/// bound to them.
///
/// The allocator is shared between any number of [`ResourceAllocation`]s, and performs its own
/// synchronization if it is used from several threads. Nothing in this crate locks around it.
///
/// # Safety
///
/// - `create_buffer` and `create_image` must return a resource that is bound to the returned
///   allocation, and the allocation must live in a memory type whose properties contain the
///   `required_flags` of the allocation create info.
/// - `allocation_info` must describe the allocation truthfully, and `memory_type_properties`
///   must return the property flags of the given memory type.
/// - `map_memory` must return a pointer to at least `allocation_info(..).size` bytes that stays
///   valid until the matching `unmap_memory`.
///
/// [`ResourceAllocation`]: super::ResourceAllocation
pub unsafe trait MemoryAllocator {
    /// The opaque record of one allocation.
    type Allocation;

    /// A custom memory pool that allocations can be drawn from.
    type Pool;

    /// Creates a buffer, allocates memory for it and binds the two together.
    ///
    /// # Safety
    ///
    /// - `create_info` must be a valid buffer create info.
    unsafe fn create_buffer(
        &self,
        create_info: &vk::BufferCreateInfo<'_>,
        allocation_create_info: &AllocationCreateInfo<Self::Pool>,
    ) -> Result<(vk::Buffer, Self::Allocation), VulkanError>;

    /// Creates an image, allocates memory for it and binds the two together.
    ///
    /// # Safety
    ///
    /// - `create_info` must be a valid image create info.
    unsafe fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo<'_>,
        allocation_create_info: &AllocationCreateInfo<Self::Pool>,
    ) -> Result<(vk::Image, Self::Allocation), VulkanError>;

    /// Destroys a buffer and frees the memory that was allocated for it.
    ///
    /// # Safety
    ///
    /// - `buffer` and `allocation` must have been created together by this allocator and must not
    ///   have been destroyed yet.
    /// - The device must no longer use the buffer.
    unsafe fn destroy_buffer(&self, buffer: vk::Buffer, allocation: &mut Self::Allocation);

    /// Destroys an image and frees the memory that was allocated for it.
    ///
    /// # Safety
    ///
    /// - `image` and `allocation` must have been created together by this allocator and must not
    ///   have been destroyed yet.
    /// - The device must no longer use the image.
    unsafe fn destroy_image(&self, image: vk::Image, allocation: &mut Self::Allocation);

    /// Maps the allocation into the address space of the host.
    ///
    /// # Safety
    ///
    /// - The allocation must live in host-visible memory.
    unsafe fn map_memory(
        &self,
        allocation: &mut Self::Allocation,
    ) -> Result<NonNull<u8>, VulkanError>;

    /// Unmaps an allocation that was mapped with `map_memory`.
    ///
    /// # Safety
    ///
    /// - Every call must be paired with a preceding call to `map_memory`.
    unsafe fn unmap_memory(&self, allocation: &mut Self::Allocation);

    /// Flushes the host caches for a range of the allocation, making host writes visible to the
    /// device. `size` may be [`vk::WHOLE_SIZE`].
    fn flush_allocation(
        &self,
        allocation: &Self::Allocation,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<(), VulkanError>;

    /// Invalidates the host caches for a range of the allocation, making device writes visible to
    /// the host. `size` may be [`vk::WHOLE_SIZE`].
    fn invalidate_allocation(
        &self,
        allocation: &Self::Allocation,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<(), VulkanError>;

    /// Returns where the allocation lives.
    fn allocation_info(&self, allocation: &Self::Allocation) -> AllocationInfo;

    /// Returns the property flags of a memory type.
    fn memory_type_properties(&self, memory_type_index: u32) -> vk::MemoryPropertyFlags;

    /// Creates a custom memory pool.
    fn create_pool(&self, create_info: &PoolCreateInfo) -> Result<Self::Pool, VulkanError>;
}

/// Creates a custom memory pool with `allocator`, ready to be passed to
/// [`ResourceAllocation::new_in_pool`](super::ResourceAllocation::new_in_pool).
#[inline]
pub fn alloc_custom_pool<A>(
    allocator: &A,
    create_info: &PoolCreateInfo,
) -> Result<Arc<A::Pool>, VulkanError>
where
    A: MemoryAllocator + ?Sized,
{
    allocator.create_pool(create_info).map(Arc::new)
}

/// How the allocator is allowed to pick a memory type beyond the required property flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MemoryUsage {
    /// The memory type is selected from the required and preferred flags only.
    #[default]
    Unknown,
    /// The allocator picks the memory type from the resource usage.
    Auto,
    /// Like `Auto`, favoring device-local memory.
    AutoPreferDevice,
    /// Like `Auto`, favoring memory on the host.
    AutoPreferHost,
}

/// Parameters the allocator uses to select the memory for an allocation.
pub struct AllocationCreateInfo<P> {
    /// Properties that the memory type must have.
    ///
    /// The default value is empty.
    pub required_flags: vk::MemoryPropertyFlags,

    /// Properties that the memory type should have if possible.
    ///
    /// The default value is empty.
    pub preferred_flags: vk::MemoryPropertyFlags,

    /// The selection policy of the allocator.
    ///
    /// The default value is [`MemoryUsage::Unknown`].
    pub usage: MemoryUsage,

    /// A custom pool to allocate from instead of the default pools of the allocator.
    ///
    /// The default value is `None`.
    pub pool: Option<Arc<P>>,

    pub _ne: NonExhaustive,
}

impl<P> AllocationCreateInfo<P> {
    /// Returns an `AllocationCreateInfo` that requires `required_flags` and leaves everything
    /// else to the automatic selection of the allocator.
    #[inline]
    pub fn required(required_flags: vk::MemoryPropertyFlags) -> Self {
        Self {
            required_flags,
            usage: MemoryUsage::Auto,
            ..Default::default()
        }
    }
}

impl<P> Default for AllocationCreateInfo<P> {
    #[inline]
    fn default() -> Self {
        Self {
            required_flags: vk::MemoryPropertyFlags::empty(),
            preferred_flags: vk::MemoryPropertyFlags::empty(),
            usage: MemoryUsage::Unknown,
            pool: None,
            _ne: NonExhaustive(()),
        }
    }
}

impl<P> Clone for AllocationCreateInfo<P> {
    fn clone(&self) -> Self {
        Self {
            required_flags: self.required_flags,
            preferred_flags: self.preferred_flags,
            usage: self.usage,
            pool: self.pool.clone(),
            _ne: NonExhaustive(()),
        }
    }
}

impl<P> fmt::Debug for AllocationCreateInfo<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationCreateInfo")
            .field("required_flags", &self.required_flags)
            .field("preferred_flags", &self.preferred_flags)
            .field("usage", &self.usage)
            .field("pool", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

/// Where an allocation lives, as reported by the allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocationInfo {
    /// The index of the memory type the allocation was made from.
    pub memory_type: u32,
    /// The device memory object the allocation is a part of.
    pub device_memory: vk::DeviceMemory,
    /// The offset of the allocation within `device_memory`, in bytes.
    pub offset: DeviceSize,
    /// The size of the allocation, in bytes.
    pub size: DeviceSize,
}

/// Parameters to create a custom memory pool.
#[derive(Clone, Debug)]
pub struct PoolCreateInfo {
    /// The memory type that all allocations of the pool are made from.
    ///
    /// The default value is `0`.
    pub memory_type_index: u32,

    /// The size of a single block of device memory. `0` lets the allocator decide.
    ///
    /// The default value is `0`.
    pub block_size: DeviceSize,

    /// The number of blocks that are always allocated.
    ///
    /// The default value is `0`.
    pub min_block_count: usize,

    /// The maximum number of blocks. `0` means no limit.
    ///
    /// The default value is `0`.
    pub max_block_count: usize,

    pub _ne: NonExhaustive,
}

impl Default for PoolCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            memory_type_index: 0,
            block_size: 0,
            min_block_count: 0,
            max_block_count: 0,
            _ne: NonExhaustive(()),
        }
    }
}
