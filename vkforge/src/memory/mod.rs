// Copyright (c) 2024 The vkforge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Device memory allocations bound to buffers and images.
//!
//! # Memory types
//!
//! A physical device exposes one or more **memory types**, each with its own property flags.
//! A memory type may or may not be visible to the host. In other words, it may or may not be
//! directly writable by the CPU. A host-visible memory type may or may not be **host-coherent**:
//! on coherent memory, writes done by the CPU are automatically visible to the device and the
//! other way around. On non-coherent memory, the host caches have to be maintained explicitly:
//!
//! - after the CPU wrote to mapped memory, the range must be *flushed* before the device reads it,
//! - before the CPU reads mapped memory written by the device, the range must be *invalidated*.
//!
//! The memory type an allocation ends up in is chosen by the allocator, and may have more
//! properties than what was requested. [`ResourceAllocation`] therefore always asks the allocator
//! for the actual properties of the memory type before deciding whether cache maintenance is
//! needed.
//!
//! # Allocators
//!
//! This crate doesn't manage device memory itself. It draws allocations from an implementation of
//! the [`MemoryAllocator`] trait, which is shared between any number of allocations and must
//! outlive all of them. With the `vma` feature enabled, the trait is implemented for
//! [`vk_mem::Allocator`].
//!
//! ```
//! use std::sync::Arc;
//! use vkforge::ash::vk;
//! use vkforge::memory::{MappingAccess, MemoryAllocator, ResourceAllocation};
//!
//! fn upload<A: MemoryAllocator>(allocator: Arc<A>, data: &[u32]) -> ResourceAllocation<A> {
//!     let create_info = vk::BufferCreateInfo::default()
//!         .size(std::mem::size_of_val(data) as u64)
//!         .usage(vk::BufferUsageFlags::VERTEX_BUFFER);
//!     let mut allocation = ResourceAllocation::new_buffer(
//!         allocator,
//!         vk::MemoryPropertyFlags::HOST_VISIBLE,
//!         &create_info,
//!     )
//!     .unwrap();
//!
//!     let mut mapping = allocation.map(MappingAccess::Write).unwrap();
//!     mapping.write(0, data);
//!     mapping.unmap().unwrap();
//!
//!     allocation
//! }
//! ```

pub use self::{
    allocation::{
        AllocatedResource, AllocationCreationError, MemoryMapping, ResourceAllocation,
        ResourceCreateInfo,
    },
    allocator::{
        alloc_custom_pool, AllocationCreateInfo, AllocationInfo, MemoryAllocator, MemoryUsage,
        PoolCreateInfo,
    },
};

mod allocation;
mod allocator;
#[cfg(feature = "vma")]
mod vma;

/// The intent of the host when mapping memory.
///
/// The intent decides which cache maintenance operations are issued for non-coherent memory:
/// reads cause an invalidation when the memory is mapped, writes cause a flush before the memory
/// is unmapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MappingAccess {
    /// The host only reads from the mapped memory.
    Read,
    /// The host only writes to the mapped memory.
    Write,
    /// The host both reads from and writes to the mapped memory.
    ReadWrite,
}

impl MappingAccess {
    /// Returns whether the intent includes reading.
    #[inline]
    pub fn includes_read(self) -> bool {
        matches!(self, MappingAccess::Read | MappingAccess::ReadWrite)
    }

    /// Returns whether the intent includes writing.
    #[inline]
    pub fn includes_write(self) -> bool {
        matches!(self, MappingAccess::Write | MappingAccess::ReadWrite)
    }
}
