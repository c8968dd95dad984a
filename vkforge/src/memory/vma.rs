// Copyright (c) 2024 The vkforge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! [`MemoryAllocator`] implementation for the Vulkan Memory Allocator.

use super::{AllocationCreateInfo, AllocationInfo, MemoryAllocator, MemoryUsage, PoolCreateInfo};
use crate::{DeviceSize, VulkanError};
use ash::vk;
use std::ptr::NonNull;
use vk_mem::Alloc;

impl From<MemoryUsage> for vk_mem::MemoryUsage {
    #[inline]
    fn from(val: MemoryUsage) -> Self {
        match val {
            MemoryUsage::Unknown => vk_mem::MemoryUsage::Unknown,
            MemoryUsage::Auto => vk_mem::MemoryUsage::Auto,
            MemoryUsage::AutoPreferDevice => vk_mem::MemoryUsage::AutoPreferDevice,
            MemoryUsage::AutoPreferHost => vk_mem::MemoryUsage::AutoPreferHost,
        }
    }
}

/// Returns the flags of a memory type, or empty flags if the device doesn't have that type.
fn property_flags_of_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    memory_type_index: u32,
) -> vk::MemoryPropertyFlags {
    properties
        .memory_types_as_slice()
        .get(memory_type_index as usize)
        .map_or(vk::MemoryPropertyFlags::empty(), |memory_type| {
            memory_type.property_flags
        })
}

fn vma_create_info(
    create_info: &AllocationCreateInfo<vk_mem::AllocatorPool>,
) -> vk_mem::AllocationCreateInfo {
    let mut flags = vk_mem::AllocationCreateFlags::empty();

    // The automatic usages only pick host-visible memory when host access is declared.
    if create_info.usage != MemoryUsage::Unknown
        && create_info
            .required_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    {
        flags |= vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM;
    }

    vk_mem::AllocationCreateInfo {
        flags,
        usage: create_info.usage.into(),
        required_flags: create_info.required_flags,
        preferred_flags: create_info.preferred_flags,
        ..Default::default()
    }
}

unsafe impl MemoryAllocator for vk_mem::Allocator {
    type Allocation = vk_mem::Allocation;
    type Pool = vk_mem::AllocatorPool;

    unsafe fn create_buffer(
        &self,
        create_info: &vk::BufferCreateInfo<'_>,
        allocation_create_info: &AllocationCreateInfo<Self::Pool>,
    ) -> Result<(vk::Buffer, Self::Allocation), VulkanError> {
        let vma_info = vma_create_info(allocation_create_info);

        let result = match &allocation_create_info.pool {
            Some(pool) => unsafe { Alloc::create_buffer(&**pool, create_info, &vma_info) },
            None => unsafe { Alloc::create_buffer(self, create_info, &vma_info) },
        };

        result.map_err(VulkanError::from)
    }

    unsafe fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo<'_>,
        allocation_create_info: &AllocationCreateInfo<Self::Pool>,
    ) -> Result<(vk::Image, Self::Allocation), VulkanError> {
        let vma_info = vma_create_info(allocation_create_info);

        let result = match &allocation_create_info.pool {
            Some(pool) => unsafe { Alloc::create_image(&**pool, create_info, &vma_info) },
            None => unsafe { Alloc::create_image(self, create_info, &vma_info) },
        };

        result.map_err(VulkanError::from)
    }

    #[inline]
    unsafe fn destroy_buffer(&self, buffer: vk::Buffer, allocation: &mut Self::Allocation) {
        unsafe { vk_mem::Allocator::destroy_buffer(self, buffer, allocation) }
    }

    #[inline]
    unsafe fn destroy_image(&self, image: vk::Image, allocation: &mut Self::Allocation) {
        unsafe { vk_mem::Allocator::destroy_image(self, image, allocation) }
    }

    unsafe fn map_memory(
        &self,
        allocation: &mut Self::Allocation,
    ) -> Result<NonNull<u8>, VulkanError> {
        let pointer = unsafe { vk_mem::Allocator::map_memory(self, allocation)? };

        NonNull::new(pointer).ok_or(VulkanError::MemoryMapFailed)
    }

    #[inline]
    unsafe fn unmap_memory(&self, allocation: &mut Self::Allocation) {
        unsafe { vk_mem::Allocator::unmap_memory(self, allocation) }
    }

    #[allow(unused_unsafe)]
    fn flush_allocation(
        &self,
        allocation: &Self::Allocation,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<(), VulkanError> {
        unsafe { vk_mem::Allocator::flush_allocation(self, allocation, offset, size) }
            .map_err(VulkanError::from)
    }

    #[allow(unused_unsafe)]
    fn invalidate_allocation(
        &self,
        allocation: &Self::Allocation,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<(), VulkanError> {
        unsafe { vk_mem::Allocator::invalidate_allocation(self, allocation, offset, size) }
            .map_err(VulkanError::from)
    }

    #[allow(unused_unsafe)]
    fn allocation_info(&self, allocation: &Self::Allocation) -> AllocationInfo {
        let info = unsafe { vk_mem::Allocator::get_allocation_info(self, allocation) };

        AllocationInfo {
            memory_type: info.memory_type,
            device_memory: info.device_memory,
            offset: info.offset,
            size: info.size,
        }
    }

    #[allow(unused_unsafe)]
    fn memory_type_properties(&self, memory_type_index: u32) -> vk::MemoryPropertyFlags {
        let properties = unsafe { vk_mem::Allocator::get_memory_properties(self) };

        property_flags_of_type(&properties, memory_type_index)
    }

    #[allow(unused_unsafe)]
    fn create_pool(&self, create_info: &PoolCreateInfo) -> Result<Self::Pool, VulkanError> {
        let vma_info = vk_mem::PoolCreateInfo {
            memory_type_index: create_info.memory_type_index,
            block_size: create_info.block_size,
            min_block_count: create_info.min_block_count,
            max_block_count: create_info.max_block_count,
            ..Default::default()
        };

        let pool =
            unsafe { vk_mem::Allocator::create_pool(self, &vma_info) }.map_err(VulkanError::from)?;
        tracing::debug!(
            memory_type_index = create_info.memory_type_index,
            "created custom memory pool",
        );

        Ok(pool)
    }
}
