// Copyright (c) 2024 The vkforge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{AllocationCreateInfo, AllocationInfo, MappingAccess, MemoryAllocator};
use crate::{DeviceSize, OomError, VulkanError};
use ash::vk;
use std::{
    error::Error,
    fmt::{self, Display, Error as FmtError, Formatter},
    mem::size_of,
    ptr::NonNull,
    slice,
    sync::Arc,
};

/// A resource that carries its own memory allocation.
///
/// Only buffers and images are backed by GPU memory, so these are the only kinds of resources a
/// [`ResourceAllocation`] can own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocatedResource {
    Buffer(vk::Buffer),
    Image(vk::Image),
}

impl AllocatedResource {
    /// Returns the buffer handle, if the resource is a buffer.
    #[inline]
    pub fn buffer(&self) -> Option<vk::Buffer> {
        match *self {
            AllocatedResource::Buffer(buffer) => Some(buffer),
            AllocatedResource::Image(_) => None,
        }
    }

    /// Returns the image handle, if the resource is an image.
    #[inline]
    pub fn image(&self) -> Option<vk::Image> {
        match *self {
            AllocatedResource::Buffer(_) => None,
            AllocatedResource::Image(image) => Some(image),
        }
    }
}

/// Describes the resource to create together with its allocation.
#[derive(Clone, Copy, Debug)]
pub enum ResourceCreateInfo<'a> {
    Buffer(vk::BufferCreateInfo<'a>),
    Image(vk::ImageCreateInfo<'a>),
}

impl<'a> From<vk::BufferCreateInfo<'a>> for ResourceCreateInfo<'a> {
    #[inline]
    fn from(val: vk::BufferCreateInfo<'a>) -> Self {
        ResourceCreateInfo::Buffer(val)
    }
}

impl<'a> From<vk::ImageCreateInfo<'a>> for ResourceCreateInfo<'a> {
    #[inline]
    fn from(val: vk::ImageCreateInfo<'a>) -> Self {
        ResourceCreateInfo::Image(val)
    }
}

/// One memory allocation bound to one buffer or image.
///
/// The allocation owns both the resource and the memory, and releases them together when it is
/// destroyed, either explicitly with [`destroy`](Self::destroy) or when it is dropped. Destroying
/// is idempotent: once destroyed, the allocation is *empty* and destroying it again does nothing.
///
/// Allocations cannot be cloned. Moving one out with [`take`](Self::take) (or
/// [`std::mem::take`]) leaves an empty allocation behind, which reports no allocator and no
/// resource.
///
/// # Mapping
///
/// Memory in a host-visible memory type can be mapped with [`map`](Self::map), which returns a
/// guard that unmaps on drop, or with the lower-level [`map_memory`](Self::map_memory) and
/// [`unmap_memory`](Self::unmap_memory) pair. Cache maintenance for non-coherent memory is
/// issued over the whole allocation according to the declared [`MappingAccess`].
pub struct ResourceAllocation<A: MemoryAllocator> {
    allocator: Option<Arc<A>>,
    create_info: AllocationCreateInfo<A::Pool>,
    allocation: Option<A::Allocation>,
    allocation_info: AllocationInfo,
    resource: Option<AllocatedResource>,
}

impl<A: MemoryAllocator> ResourceAllocation<A> {
    /// Creates a resource together with memory that has at least `memory_properties`.
    ///
    /// The memory type is otherwise left to the allocator.
    pub fn new(
        allocator: Arc<A>,
        memory_properties: vk::MemoryPropertyFlags,
        create_info: &ResourceCreateInfo<'_>,
    ) -> Result<Self, AllocationCreationError> {
        Self::with_create_info(
            allocator,
            AllocationCreateInfo::required(memory_properties),
            create_info,
        )
    }

    /// Same as `new`, but allocates from a custom memory pool.
    pub fn new_in_pool(
        allocator: Arc<A>,
        memory_properties: vk::MemoryPropertyFlags,
        create_info: &ResourceCreateInfo<'_>,
        pool: Arc<A::Pool>,
    ) -> Result<Self, AllocationCreationError> {
        Self::with_create_info(
            allocator,
            AllocationCreateInfo {
                pool: Some(pool),
                ..AllocationCreateInfo::required(memory_properties)
            },
            create_info,
        )
    }

    /// Creates a buffer together with memory that has at least `memory_properties`.
    #[inline]
    pub fn new_buffer(
        allocator: Arc<A>,
        memory_properties: vk::MemoryPropertyFlags,
        create_info: &vk::BufferCreateInfo<'_>,
    ) -> Result<Self, AllocationCreationError> {
        Self::new(
            allocator,
            memory_properties,
            &ResourceCreateInfo::Buffer(*create_info),
        )
    }

    /// Creates an image together with memory that has at least `memory_properties`.
    #[inline]
    pub fn new_image(
        allocator: Arc<A>,
        memory_properties: vk::MemoryPropertyFlags,
        create_info: &vk::ImageCreateInfo<'_>,
    ) -> Result<Self, AllocationCreationError> {
        Self::new(
            allocator,
            memory_properties,
            &ResourceCreateInfo::Image(*create_info),
        )
    }

    /// Creates a resource and its memory with full control over the allocation parameters.
    pub fn with_create_info(
        allocator: Arc<A>,
        allocation_create_info: AllocationCreateInfo<A::Pool>,
        create_info: &ResourceCreateInfo<'_>,
    ) -> Result<Self, AllocationCreationError> {
        Self::validate(create_info)?;

        let (resource, allocation) = unsafe {
            match create_info {
                ResourceCreateInfo::Buffer(info) => {
                    let (buffer, allocation) =
                        allocator.create_buffer(info, &allocation_create_info)?;
                    (AllocatedResource::Buffer(buffer), allocation)
                }
                ResourceCreateInfo::Image(info) => {
                    let (image, allocation) =
                        allocator.create_image(info, &allocation_create_info)?;
                    (AllocatedResource::Image(image), allocation)
                }
            }
        };

        let allocation_info = allocator.allocation_info(&allocation);
        tracing::debug!(
            resource = ?resource,
            memory_type = allocation_info.memory_type,
            size = allocation_info.size,
            "created resource allocation",
        );

        Ok(ResourceAllocation {
            allocator: Some(allocator),
            create_info: allocation_create_info,
            allocation: Some(allocation),
            allocation_info,
            resource: Some(resource),
        })
    }

    fn validate(create_info: &ResourceCreateInfo<'_>) -> Result<(), AllocationCreationError> {
        match create_info {
            ResourceCreateInfo::Buffer(info) => {
                // VUID-VkBufferCreateInfo-size-00912
                if info.size == 0 {
                    return Err(AllocationCreationError::BufferSizeZero);
                }
            }
            ResourceCreateInfo::Image(info) => {
                // VUID-VkImageCreateInfo-extent-00944
                // VUID-VkImageCreateInfo-extent-00945
                // VUID-VkImageCreateInfo-extent-00946
                let extent = info.extent;
                if extent.width == 0 || extent.height == 0 || extent.depth == 0 {
                    return Err(AllocationCreationError::ImageExtentZero);
                }
            }
        }

        Ok(())
    }

    /// Takes ownership of a resource and the allocation bound to it.
    ///
    /// # Safety
    ///
    /// - `allocation` must have been created by `allocator` together with `resource`, and both
    ///   must not be owned by anything else.
    /// - `create_info` should be the parameters `allocation` was created with.
    pub unsafe fn from_parts(
        allocator: Arc<A>,
        create_info: AllocationCreateInfo<A::Pool>,
        allocation: A::Allocation,
        resource: AllocatedResource,
    ) -> Self {
        let allocation_info = allocator.allocation_info(&allocation);

        ResourceAllocation {
            allocator: Some(allocator),
            create_info,
            allocation: Some(allocation),
            allocation_info,
            resource: Some(resource),
        }
    }

    /// Returns the allocator this allocation was drawn from, or `None` if the allocation is
    /// empty.
    #[inline]
    pub fn allocator(&self) -> Option<&Arc<A>> {
        self.allocator.as_ref()
    }

    /// Returns the parameters that were used to allocate the memory.
    #[inline]
    pub fn create_info(&self) -> &AllocationCreateInfo<A::Pool> {
        &self.create_info
    }

    /// Returns the allocator's record of the allocation, or `None` if the allocation is empty.
    #[inline]
    pub fn allocation(&self) -> Option<&A::Allocation> {
        self.allocation.as_ref()
    }

    /// Returns the owned resource, or `None` if the allocation is empty.
    #[inline]
    pub fn resource(&self) -> Option<AllocatedResource> {
        self.resource
    }

    /// Returns the owned buffer, if the resource is a buffer.
    #[inline]
    pub fn buffer(&self) -> Option<vk::Buffer> {
        self.resource.and_then(|resource| resource.buffer())
    }

    /// Returns the owned image, if the resource is an image.
    #[inline]
    pub fn image(&self) -> Option<vk::Image> {
        self.resource.and_then(|resource| resource.image())
    }

    /// Returns the allocation info that was cached when the allocation was created.
    #[inline]
    pub fn allocation_info(&self) -> &AllocationInfo {
        &self.allocation_info
    }

    /// Returns the size of the allocation in bytes.
    #[inline]
    pub fn size(&self) -> DeviceSize {
        self.allocation_info.size
    }

    /// Returns `true` if the allocation was destroyed or moved out of.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resource.is_none()
    }

    /// Returns the properties of the memory type the allocation actually lives in.
    ///
    /// These can include more flags than what was requested, because the allocator is free to
    /// pick any memory type that satisfies the request. An empty allocation has no properties.
    pub fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        match &self.allocator {
            Some(allocator) => allocator.memory_type_properties(self.allocation_info.memory_type),
            None => vk::MemoryPropertyFlags::empty(),
        }
    }

    /// Returns the device memory object and the offset within it where the allocation lives.
    #[inline]
    pub fn device_memory_and_offset(&self) -> (vk::DeviceMemory, DeviceSize) {
        (
            self.allocation_info.device_memory,
            self.allocation_info.offset,
        )
    }

    /// Maps the memory in order to read from or write into it.
    ///
    /// If `access` includes reading and the memory is not host-coherent, the whole allocation is
    /// invalidated before the pointer is returned, so that writes of the device are visible.
    /// Every successful call must be paired with one call to `unmap_memory`. Consider using
    /// [`map`](Self::map) instead.
    ///
    /// # Panics
    ///
    /// - Panics if the allocation is empty.
    /// - Panics if the memory is not host-visible.
    pub fn map_memory(&mut self, access: MappingAccess) -> Result<NonNull<u8>, VulkanError> {
        let memory_properties = self.host_visible_properties();
        let (allocator, allocation) = self.parts_mut();

        let pointer = unsafe { allocator.map_memory(allocation)? };

        let invalidate = access.includes_read()
            && !memory_properties.contains(vk::MemoryPropertyFlags::HOST_COHERENT);
        if invalidate {
            if let Err(err) = allocator.invalidate_allocation(allocation, 0, vk::WHOLE_SIZE) {
                unsafe { allocator.unmap_memory(allocation) };
                return Err(err);
            }
        }

        tracing::trace!(?access, invalidate, "mapped allocation");

        Ok(pointer)
    }

    /// Unmaps memory that was mapped with `map_memory`.
    ///
    /// If `access` includes writing and the memory is not host-coherent, the whole allocation is
    /// flushed before it is unmapped, so that writes of the host are visible to the device. The
    /// memory is unmapped even if the flush fails.
    ///
    /// # Panics
    ///
    /// - Panics if the allocation is empty.
    /// - Panics if the memory is not host-visible.
    ///
    /// # Safety
    ///
    /// - The call must be paired with a preceding successful call to `map_memory`.
    /// - Pointers returned by that call must not be used afterwards.
    pub unsafe fn unmap_memory(&mut self, access: MappingAccess) -> Result<(), VulkanError> {
        let memory_properties = self.host_visible_properties();
        let (allocator, allocation) = self.parts_mut();

        let flush = access.includes_write()
            && !memory_properties.contains(vk::MemoryPropertyFlags::HOST_COHERENT);
        let result = if flush {
            allocator.flush_allocation(allocation, 0, vk::WHOLE_SIZE)
        } else {
            Ok(())
        };

        unsafe { allocator.unmap_memory(allocation) };
        tracing::trace!(?access, flush, "unmapped allocation");

        result
    }

    /// Maps the memory and returns a guard that gives access to it and unmaps it when dropped.
    ///
    /// # Panics
    ///
    /// - Panics if the allocation is empty.
    /// - Panics if the memory is not host-visible.
    pub fn map(&mut self, access: MappingAccess) -> Result<MemoryMapping<'_, A>, VulkanError> {
        let pointer = self.map_memory(access)?;
        let len = self.allocation_info.size as usize;

        Ok(MemoryMapping {
            allocation: self,
            access,
            pointer,
            len,
            unmapped: false,
        })
    }

    /// Destroys the resource and frees its memory, leaving the allocation empty.
    ///
    /// Does nothing if the allocation is already empty.
    pub fn destroy(&mut self) {
        let allocator = self.allocator.take();
        let allocation = self.allocation.take();
        let resource = self.resource.take();

        if let (Some(allocator), Some(mut allocation), Some(resource)) =
            (allocator, allocation, resource)
        {
            unsafe {
                match resource {
                    AllocatedResource::Buffer(buffer) => {
                        allocator.destroy_buffer(buffer, &mut allocation)
                    }
                    AllocatedResource::Image(image) => {
                        allocator.destroy_image(image, &mut allocation)
                    }
                }
            }

            tracing::debug!(resource = ?resource, "destroyed resource allocation");
        }

        self.create_info = AllocationCreateInfo::default();
        self.allocation_info = AllocationInfo::default();
    }

    /// Moves the allocation out, leaving an empty allocation in its place.
    #[inline]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    fn host_visible_properties(&self) -> vk::MemoryPropertyFlags {
        let memory_properties = self.memory_properties();
        assert!(
            memory_properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE),
            "the allocation does not live in host-visible memory and can't be mapped",
        );

        memory_properties
    }

    fn parts_mut(&mut self) -> (&A, &mut A::Allocation) {
        match (&self.allocator, &mut self.allocation) {
            (Some(allocator), Some(allocation)) => (&**allocator, allocation),
            _ => panic!("the allocation is empty; it was destroyed or moved out of"),
        }
    }
}

impl<A: MemoryAllocator> Default for ResourceAllocation<A> {
    /// Returns an empty allocation.
    #[inline]
    fn default() -> Self {
        ResourceAllocation {
            allocator: None,
            create_info: AllocationCreateInfo::default(),
            allocation: None,
            allocation_info: AllocationInfo::default(),
            resource: None,
        }
    }
}

impl<A: MemoryAllocator> Drop for ResourceAllocation<A> {
    #[inline]
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<A: MemoryAllocator> fmt::Debug for ResourceAllocation<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceAllocation")
            .field("resource", &self.resource)
            .field("create_info", &self.create_info)
            .field("allocation_info", &self.allocation_info)
            .finish_non_exhaustive()
    }
}

/// Memory of a [`ResourceAllocation`] mapped into the address space of the host.
///
/// The memory is unmapped when the guard is dropped. Prefer calling [`unmap`](Self::unmap)
/// explicitly after writing, since a failure to flush can only be logged on drop.
pub struct MemoryMapping<'a, A: MemoryAllocator> {
    allocation: &'a mut ResourceAllocation<A>,
    access: MappingAccess,
    pointer: NonNull<u8>,
    len: usize,
    unmapped: bool,
}

impl<'a, A: MemoryAllocator> MemoryMapping<'a, A> {
    /// Returns the access intent the memory was mapped with.
    #[inline]
    pub fn access(&self) -> MappingAccess {
        self.access
    }

    /// Returns the number of mapped bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns a raw pointer to the start of the mapped memory.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.pointer.as_ptr()
    }

    /// Returns the mapped bytes.
    ///
    /// # Panics
    ///
    /// - Panics if the memory was not mapped with read access.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        assert!(
            self.access.includes_read(),
            "the memory was mapped without read access",
        );

        unsafe { slice::from_raw_parts(self.pointer.as_ptr(), self.len) }
    }

    /// Returns the mapped bytes mutably.
    ///
    /// # Panics
    ///
    /// - Panics if the memory was not mapped with write access.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        assert!(
            self.access.includes_write(),
            "the memory was mapped without write access",
        );

        unsafe { slice::from_raw_parts_mut(self.pointer.as_ptr(), self.len) }
    }

    /// Reads a value at byte `offset`. The offset doesn't need to be aligned.
    ///
    /// # Panics
    ///
    /// - Panics if the memory was not mapped with read access.
    /// - Panics if the value doesn't fit in the mapped memory.
    pub fn read<T: bytemuck::Pod>(&self, offset: usize) -> T {
        let bytes = &self.as_slice()[offset..offset + size_of::<T>()];
        bytemuck::pod_read_unaligned(bytes)
    }

    /// Copies `data` into the mapped memory, starting at byte `offset`.
    ///
    /// # Panics
    ///
    /// - Panics if the memory was not mapped with write access.
    /// - Panics if `data` doesn't fit in the mapped memory.
    pub fn write<T: bytemuck::Pod>(&mut self, offset: usize, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.as_mut_slice()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Unmaps the memory, returning the result of the flush if one was needed.
    pub fn unmap(mut self) -> Result<(), VulkanError> {
        self.unmapped = true;
        unsafe { self.allocation.unmap_memory(self.access) }
    }
}

impl<'a, A: MemoryAllocator> Drop for MemoryMapping<'a, A> {
    fn drop(&mut self) {
        if self.unmapped {
            return;
        }

        if let Err(err) = unsafe { self.allocation.unmap_memory(self.access) } {
            tracing::error!(%err, "failed to flush mapped memory before unmapping");
        }
    }
}

/// Error that can happen when creating a [`ResourceAllocation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationCreationError {
    /// Not enough memory.
    OomError(OomError),

    /// The allocator rejected the request.
    VulkanError(VulkanError),

    /// The buffer create info has a `size` of zero.
    BufferSizeZero,

    /// The image create info has an `extent` with a zero dimension.
    ImageExtentZero,
}

impl Error for AllocationCreationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::OomError(err) => Some(err),
            Self::VulkanError(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for AllocationCreationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::OomError(_) => write!(f, "not enough memory available"),
            Self::VulkanError(_) => write!(f, "the allocator rejected the request"),
            Self::BufferSizeZero => write!(f, "the buffer `size` is zero"),
            Self::ImageExtentZero => write!(f, "one of the image `extent` dimensions is zero"),
        }
    }
}

impl From<VulkanError> for AllocationCreationError {
    fn from(err: VulkanError) -> Self {
        if err.is_oom() {
            Self::OomError(err.into())
        } else {
            Self::VulkanError(err)
        }
    }
}

impl From<OomError> for AllocationCreationError {
    #[inline]
    fn from(err: OomError) -> Self {
        Self::OomError(err)
    }
}
