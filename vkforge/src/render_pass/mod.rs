// Copyright (c) 2024 The vkforge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Description of the steps of the rendering process, and the images used as input or output.
//!
//! A *render pass* describes the overall process of drawing a frame. It is made up of three
//! parts:
//!
//! - A list of attachments, which are the images that are inputs, outputs or intermediate stages
//!   of the rendering process. An attachment is identified by its index in the list.
//! - One or more subpasses, which are the steps in which the rendering takes place. Each subpass
//!   references attachments in one of five roles: input, color, depth/stencil, resolve or
//!   preserve.
//! - Dependencies, which describe how the results of one subpass are passed on to the next, and
//!   how the render pass synchronizes with the commands around it.
//!
//! Render passes are built in two phases. A [`RenderPassDescription`] is a mutable draft that is
//! classified and validated when it is created, and can be adjusted afterwards. Calling
//! [`build`](RenderPassDescription::build) validates it again and realizes it into a
//! [`RenderPass`], whose content can no longer change.
//!
//! ```
//! use std::sync::Arc;
//! use vkforge::ash::vk;
//! use vkforge::render_pass::{Attachment, LoadOp, RenderPass, RenderPassDevice, StoreOp, SubpassUsage};
//!
//! # fn example(device: Arc<dyn RenderPassDevice>) {
//! let render_pass = RenderPass::new(
//!     device,
//!     vec![
//!         Attachment::declare(
//!             vk::Format::B8G8R8A8_SRGB,
//!             LoadOp::Clear,
//!             StoreOp::Store,
//!             [SubpassUsage::color(0)],
//!         ),
//!         Attachment::declare(
//!             vk::Format::D32_SFLOAT,
//!             LoadOp::Clear,
//!             StoreOp::DontCare,
//!             [SubpassUsage::DepthStencil],
//!         ),
//!     ],
//! )
//! .unwrap();
//!
//! assert!(render_pass.is_color_attachment(0, 0));
//! assert!(render_pass.is_depth_stencil_attachment(0, 1));
//! # }
//! ```

pub use self::{
    attachment::{Attachment, SubpassUsage},
    create::{
        RenderPassCreationError, RenderPassDescription, RenderPassSync, MAX_ATTACHMENT_LOCATIONS,
    },
};
use crate::{VulkanError, VulkanObject};
use ash::vk;
use std::{fmt, ops::Deref, sync::Arc};

#[macro_use]
mod macros;
mod attachment;
mod create;

/// The part of a Vulkan device that creates and destroys render passes.
///
/// # Safety
///
/// - `create_render_pass` must return a handle that stays valid until it is passed to
///   `destroy_render_pass`.
pub unsafe trait RenderPassDevice: Send + Sync {
    /// Creates a native render pass.
    ///
    /// # Safety
    ///
    /// - `create_info` must be valid, and every pointer in it must point to valid memory.
    unsafe fn create_render_pass(
        &self,
        create_info: &vk::RenderPassCreateInfo<'_>,
    ) -> Result<vk::RenderPass, VulkanError>;

    /// Destroys a native render pass.
    ///
    /// # Safety
    ///
    /// - `render_pass` must have been created by this device and must no longer be in use.
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass);
}

unsafe impl RenderPassDevice for ash::Device {
    #[inline]
    unsafe fn create_render_pass(
        &self,
        create_info: &vk::RenderPassCreateInfo<'_>,
    ) -> Result<vk::RenderPass, VulkanError> {
        unsafe { ash::Device::create_render_pass(self, create_info, None) }
            .map_err(VulkanError::from)
    }

    #[inline]
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { ash::Device::destroy_render_pass(self, render_pass, None) }
    }
}

/// An object representing the discrete steps in which rendering is done.
///
/// The render pass owns the native handle and the description it was created from. All the
/// queries of [`RenderPassDescription`] are available through `Deref`. To change a render pass,
/// get a copy of its description with [`to_description`](Self::to_description), adjust it and
/// build a new one.
pub struct RenderPass {
    handle: vk::RenderPass,
    device: Arc<dyn RenderPassDevice>,
    description: RenderPassDescription,
}

impl RenderPass {
    /// Creates a render pass from `attachments` with the default subpass dependencies.
    ///
    /// The number of subpasses is the number of usages each attachment declares.
    #[inline]
    pub fn new(
        device: Arc<dyn RenderPassDevice>,
        attachments: Vec<Attachment>,
    ) -> Result<Arc<RenderPass>, RenderPassCreationError> {
        Self::create(device, attachments, |_| {}, |_| {})
    }

    /// Creates a render pass from `attachments`.
    ///
    /// `sync` is called once for every dependency that is synthesized: first the one from
    /// before the render pass into subpass `0`, then one between each pair of adjacent subpasses,
    /// and finally the one from the last subpass to after the render pass. It can narrow or
    /// replace the synchronization scopes.
    ///
    /// `alter` is called with the fully assembled description right before the native handle is
    /// created, and can adjust anything in it. The description is validated again afterwards.
    pub fn create(
        device: Arc<dyn RenderPassDevice>,
        attachments: Vec<Attachment>,
        sync: impl FnMut(&mut RenderPassSync),
        alter: impl FnOnce(&mut RenderPassDescription),
    ) -> Result<Arc<RenderPass>, RenderPassCreationError> {
        let mut description = RenderPassDescription::from_attachments(attachments)?;
        description.synthesize_dependencies(sync);
        alter(&mut description);

        description.build(device)
    }

    /// Wraps a native render pass.
    ///
    /// # Safety
    ///
    /// - `handle` must have been created by `device` from `description`, and must not be owned by
    ///   anything else.
    pub unsafe fn from_handle(
        device: Arc<dyn RenderPassDevice>,
        handle: vk::RenderPass,
        description: RenderPassDescription,
    ) -> Arc<RenderPass> {
        Arc::new(RenderPass {
            handle,
            device,
            description,
        })
    }

    /// Returns the device that created the render pass.
    #[inline]
    pub fn device(&self) -> &Arc<dyn RenderPassDevice> {
        &self.device
    }

    /// Returns the description the render pass was created from.
    #[inline]
    pub fn description(&self) -> &RenderPassDescription {
        &self.description
    }

    /// Returns a copy of the description, to be adjusted and built into a new render pass.
    #[inline]
    pub fn to_description(&self) -> RenderPassDescription {
        self.description.clone()
    }
}

impl Deref for RenderPass {
    type Target = RenderPassDescription;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.description
    }
}

impl Drop for RenderPass {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.device.destroy_render_pass(self.handle) };
        tracing::debug!(handle = ?self.handle, "destroyed render pass");
    }
}

unsafe impl VulkanObject for RenderPass {
    type Handle = vk::RenderPass;

    #[inline]
    fn handle(&self) -> Self::Handle {
        self.handle
    }
}

impl fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPass")
            .field("handle", &self.handle)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl PartialEq for RenderPass {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for RenderPass {}

/// Describes an attachment that will be used in a render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentDescription {
    /// The format of the image that is going to be bound.
    ///
    /// The default value is [`vk::Format::UNDEFINED`], which must be overridden.
    pub format: vk::Format,

    /// The number of samples of the image that is going to be bound.
    ///
    /// The default value is [`vk::SampleCountFlags::TYPE_1`].
    pub samples: vk::SampleCountFlags,

    /// What the implementation should do with the attachment at the start of the subpass that first
    /// uses it.
    ///
    /// The default value is [`LoadOp::DontCare`].
    pub load_op: LoadOp,

    /// What the implementation should do with the attachment at the end of the subpass that last
    /// uses it.
    ///
    /// The default value is [`StoreOp::DontCare`].
    pub store_op: StoreOp,

    /// The equivalent of `load_op` for the stencil component of the attachment, if any. Irrelevant
    /// if there is no stencil component.
    ///
    /// The default value is [`LoadOp::DontCare`].
    pub stencil_load_op: LoadOp,

    /// The equivalent of `store_op` for the stencil component of the attachment, if any. Irrelevant
    /// if there is no stencil component.
    ///
    /// The default value is [`StoreOp::DontCare`].
    pub stencil_store_op: StoreOp,

    /// The layout that the image must be in at the start of the render pass.
    ///
    /// The default value is [`vk::ImageLayout::UNDEFINED`].
    pub initial_layout: vk::ImageLayout,

    /// The layout that the image will be transitioned to at the end of the render pass.
    ///
    /// The default value is [`vk::ImageLayout::UNDEFINED`], which must be overridden.
    pub final_layout: vk::ImageLayout,

    pub _ne: crate::NonExhaustive,
}

impl Default for AttachmentDescription {
    #[inline]
    fn default() -> Self {
        Self {
            format: vk::Format::UNDEFINED,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: LoadOp::DontCare,
            store_op: StoreOp::DontCare,
            stencil_load_op: LoadOp::DontCare,
            stencil_store_op: StoreOp::DontCare,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::UNDEFINED,
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl AttachmentDescription {
    pub(crate) fn to_vk(&self) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(self.format)
            .samples(self.samples)
            .load_op(self.load_op.into())
            .store_op(self.store_op.into())
            .stencil_load_op(self.stencil_load_op.into())
            .stencil_store_op(self.stencil_store_op.into())
            .initial_layout(self.initial_layout)
            .final_layout(self.final_layout)
    }
}

/// Describes one of the subpasses of a render pass.
///
/// Input and color attachments are listed in the order of their location in the shader. If a
/// location is not used, its entry is `None`. This is useful if an unused location needs to be
/// skipped but a higher one needs to be specified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubpassDescription {
    /// The attachments that are used as input attachments in this subpass.
    ///
    /// The default value is empty.
    pub input_attachments: Vec<Option<AttachmentReference>>,

    /// The attachments that are used as color attachments in this subpass.
    ///
    /// The default value is empty.
    pub color_attachments: Vec<Option<AttachmentReference>>,

    /// The attachments that the color attachments are resolved into at the end of this subpass.
    ///
    /// This list must either be empty or have the same length as `color_attachments`. If it's not
    /// empty, then each resolve attachment is paired with the color attachment at the same
    /// position, regardless of attachment indices.
    ///
    /// The default value is empty.
    pub resolve_attachments: Vec<Option<AttachmentReference>>,

    /// The attachment that is used as depth/stencil attachment in this subpass.
    ///
    /// There can be at most one.
    ///
    /// The default value is empty.
    pub depth_stencil_attachments: Vec<AttachmentReference>,

    /// The indices of attachments that are not used by this subpass but whose content must be
    /// preserved across it.
    ///
    /// The referenced attachments must not be used in any other role in the subpass.
    ///
    /// The default value is empty.
    pub preserve_attachments: Vec<u32>,

    pub _ne: crate::NonExhaustive,
}

impl Default for SubpassDescription {
    #[inline]
    fn default() -> Self {
        Self {
            input_attachments: Vec::new(),
            color_attachments: Vec::new(),
            resolve_attachments: Vec::new(),
            depth_stencil_attachments: Vec::new(),
            preserve_attachments: Vec::new(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

fn references(list: &[Option<AttachmentReference>], attachment: u32) -> bool {
    list.iter()
        .flatten()
        .any(|reference| reference.attachment == attachment)
}

impl SubpassDescription {
    #[inline]
    pub fn is_input_attachment(&self, attachment: u32) -> bool {
        references(&self.input_attachments, attachment)
    }

    #[inline]
    pub fn is_color_attachment(&self, attachment: u32) -> bool {
        references(&self.color_attachments, attachment)
    }

    #[inline]
    pub fn is_depth_stencil_attachment(&self, attachment: u32) -> bool {
        self.depth_stencil_attachments
            .iter()
            .any(|reference| reference.attachment == attachment)
    }

    #[inline]
    pub fn is_resolve_attachment(&self, attachment: u32) -> bool {
        references(&self.resolve_attachments, attachment)
    }

    #[inline]
    pub fn is_preserve_attachment(&self, attachment: u32) -> bool {
        self.preserve_attachments.contains(&attachment)
    }

    /// Returns every attachment index referenced by this subpass, with repetitions, excluding
    /// preserved attachments.
    pub(crate) fn used_attachments(&self) -> impl Iterator<Item = u32> + '_ {
        self.input_attachments
            .iter()
            .chain(&self.color_attachments)
            .chain(&self.resolve_attachments)
            .flatten()
            .chain(&self.depth_stencil_attachments)
            .map(|reference| reference.attachment)
    }
}

/// A reference in a subpass description to a particular attachment of the render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentReference {
    /// The index of the attachment being referred to.
    ///
    /// The default value is `0`.
    pub attachment: u32,

    /// The image layout that the attachment is transitioned to at the start of the subpass.
    ///
    /// The default value is [`vk::ImageLayout::UNDEFINED`], which must be overridden.
    pub layout: vk::ImageLayout,

    pub _ne: crate::NonExhaustive,
}

impl Default for AttachmentReference {
    #[inline]
    fn default() -> Self {
        Self {
            attachment: 0,
            layout: vk::ImageLayout::UNDEFINED,
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl AttachmentReference {
    /// Returns a reference to `attachment` in `layout`.
    #[inline]
    pub fn new(attachment: u32, layout: vk::ImageLayout) -> Self {
        Self {
            attachment,
            layout,
            ..Default::default()
        }
    }

    pub(crate) fn to_vk(reference: Option<&Self>) -> vk::AttachmentReference {
        match reference {
            Some(reference) => vk::AttachmentReference {
                attachment: reference.attachment,
                layout: reference.layout,
            },
            None => vk::AttachmentReference {
                attachment: vk::ATTACHMENT_UNUSED,
                layout: vk::ImageLayout::UNDEFINED,
            },
        }
    }
}

/// A dependency between two subpasses of a render pass.
///
/// The implementation is allowed to change the order of the subpasses within a render pass, unless
/// you specify that there exists a dependency between two subpasses (ie. the result of one will be
/// used as the input of another one). Subpass dependencies work similar to pipeline barriers,
/// except that they operate on whole subpasses instead of individual images.
///
/// If `source_subpass` or `destination_subpass` are set to `None`, this specifies an external
/// dependency. An external dependency specifies a dependency on commands that were submitted before
/// the render pass instance began (for `source_subpass`), or on commands that will be submitted
/// after the render pass instance ends (for `destination_subpass`). The values must not both be
/// `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubpassDependency {
    /// The index of the subpass that writes the data that `destination_subpass` is going to use.
    ///
    /// `None` specifies an external dependency.
    ///
    /// The default value is `None`.
    pub source_subpass: Option<u32>,

    /// The index of the subpass that reads the data that `source_subpass` wrote.
    ///
    /// `None` specifies an external dependency.
    ///
    /// The default value is `None`.
    pub destination_subpass: Option<u32>,

    /// The pipeline stages that must be finished on `source_subpass` before the
    /// `destination_stages` of `destination_subpass` can start.
    ///
    /// The default value is empty.
    pub source_stages: vk::PipelineStageFlags,

    /// The pipeline stages of `destination_subpass` that must wait for the `source_stages` of
    /// `source_subpass` to be finished.
    ///
    /// The default value is empty.
    pub destination_stages: vk::PipelineStageFlags,

    /// The way `source_subpass` accesses the attachments on which we depend.
    ///
    /// The default value is empty.
    pub source_access: vk::AccessFlags,

    /// The way `destination_subpass` accesses the attachments on which we depend.
    ///
    /// The default value is empty.
    pub destination_access: vk::AccessFlags,

    /// If false, then the source operations must be fully finished for the destination operations
    /// to start. If true, then the implementation can start the destination operation for some
    /// given pixels as long as the source operation is finished for these given pixels.
    ///
    /// The default value is `false`.
    pub by_region: bool,

    pub _ne: crate::NonExhaustive,
}

impl Default for SubpassDependency {
    #[inline]
    fn default() -> Self {
        Self {
            source_subpass: None,
            destination_subpass: None,
            source_stages: vk::PipelineStageFlags::empty(),
            destination_stages: vk::PipelineStageFlags::empty(),
            source_access: vk::AccessFlags::empty(),
            destination_access: vk::AccessFlags::empty(),
            by_region: false,
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl SubpassDependency {
    pub(crate) fn to_vk(&self) -> vk::SubpassDependency {
        vk::SubpassDependency {
            src_subpass: self.source_subpass.unwrap_or(vk::SUBPASS_EXTERNAL),
            dst_subpass: self.destination_subpass.unwrap_or(vk::SUBPASS_EXTERNAL),
            src_stage_mask: self.source_stages,
            dst_stage_mask: self.destination_stages,
            src_access_mask: self.source_access,
            dst_access_mask: self.destination_access,
            dependency_flags: if self.by_region {
                vk::DependencyFlags::BY_REGION
            } else {
                vk::DependencyFlags::empty()
            },
        }
    }
}

/// Describes what the implementation should do with an attachment at the start of the subpass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(i32)]
#[non_exhaustive]
pub enum LoadOp {
    /// The content of the attachment will be loaded from memory. This is what you want if you want
    /// to draw over something existing.
    ///
    /// While this is the most intuitive option, it is also the slowest because it uses a lot of
    /// memory bandwidth.
    Load = vk::AttachmentLoadOp::LOAD.as_raw(),

    /// The content of the attachment will be filled by the implementation with a uniform value
    /// that you must provide when you start drawing.
    ///
    /// This is what you usually use at the start of a frame, in order to reset the content of
    /// the color, depth and/or stencil buffers.
    Clear = vk::AttachmentLoadOp::CLEAR.as_raw(),

    /// The attachment will have undefined content.
    ///
    /// This is what you should use for attachments that you intend to entirely cover with draw
    /// commands.
    /// If you are going to fill the attachment with a uniform value, it is better to use `Clear`
    /// instead.
    DontCare = vk::AttachmentLoadOp::DONT_CARE.as_raw(),
}

impl From<LoadOp> for vk::AttachmentLoadOp {
    #[inline]
    fn from(val: LoadOp) -> Self {
        Self::from_raw(val as i32)
    }
}

/// Describes what the implementation should do with an attachment after all the subpasses have
/// completed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(i32)]
#[non_exhaustive]
pub enum StoreOp {
    /// The attachment will be stored. This is what you usually want.
    ///
    /// While this is the most intuitive option, it is also slower than `DontCare` because it can
    /// take time to write the data back to memory.
    Store = vk::AttachmentStoreOp::STORE.as_raw(),

    /// What happens is implementation-specific.
    ///
    /// This is purely an optimization compared to `Store`. The implementation doesn't need to copy
    /// from the internal cache to the memory, which saves memory bandwidth.
    ///
    /// This doesn't mean that the data won't be copied, as an implementation is also free to not
    /// use a cache and write the output directly in memory. In other words, the content of the
    /// image will be undefined.
    DontCare = vk::AttachmentStoreOp::DONT_CARE.as_raw(),
}

impl From<StoreOp> for vk::AttachmentStoreOp {
    #[inline]
    fn from(val: StoreOp) -> Self {
        Self::from_raw(val as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AttachmentReference, LoadOp, StoreOp, SubpassDependency, SubpassDescription,
    };
    use ash::vk;

    #[test]
    fn unused_reference_to_vk() {
        let raw = AttachmentReference::to_vk(None);
        assert_eq!(raw.attachment, vk::ATTACHMENT_UNUSED);

        let reference = AttachmentReference::new(3, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let raw = AttachmentReference::to_vk(Some(&reference));
        assert_eq!(raw.attachment, 3);
        assert_eq!(raw.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn external_dependency_to_vk() {
        let dependency = SubpassDependency {
            destination_subpass: Some(0),
            by_region: true,
            ..Default::default()
        };
        let raw = dependency.to_vk();
        assert_eq!(raw.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(raw.dst_subpass, 0);
        assert_eq!(raw.dependency_flags, vk::DependencyFlags::BY_REGION);
    }

    #[test]
    fn role_queries_skip_unused() {
        let subpass = SubpassDescription {
            color_attachments: vec![
                None,
                Some(AttachmentReference::new(
                    2,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                )),
            ],
            preserve_attachments: vec![0],
            ..Default::default()
        };

        assert!(subpass.is_color_attachment(2));
        assert!(!subpass.is_color_attachment(0));
        assert!(subpass.is_preserve_attachment(0));
        assert!(!subpass.is_input_attachment(2));
        assert_eq!(subpass.used_attachments().collect::<Vec<_>>(), [2]);
    }

    #[test]
    fn ops_to_vk() {
        assert_eq!(
            vk::AttachmentLoadOp::from(LoadOp::Clear),
            vk::AttachmentLoadOp::CLEAR
        );
        assert_eq!(
            vk::AttachmentStoreOp::from(StoreOp::DontCare),
            vk::AttachmentStoreOp::DONT_CARE
        );
    }
}
