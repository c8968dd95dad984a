// Copyright (c) 2024 The vkforge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{
    Attachment, AttachmentDescription, AttachmentReference, RenderPass, RenderPassDevice,
    SubpassDependency, SubpassDescription, SubpassUsage,
};
use crate::{format::ClearValue, OomError, VulkanError};
use ash::vk;
use smallvec::SmallVec;
use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
    iter,
    sync::Arc,
};

/// The number of input and color locations a subpass can use.
///
/// Locations range from `0` to `MAX_ATTACHMENT_LOCATIONS - 1`. Devices usually support fewer
/// color attachments than this; the exact limit is checked by the driver.
pub const MAX_ATTACHMENT_LOCATIONS: u32 = 32;

/// The content of a render pass that has not been realized yet.
///
/// A description is classified and validated when it is created, and gets the default subpass
/// dependencies. Everything in it can be adjusted through the mutable accessors before it is
/// turned into a [`RenderPass`] with [`build`](Self::build).
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPassDescription {
    attachments: Vec<AttachmentDescription>,
    clear_values: Vec<ClearValue>,
    subpasses: Vec<SubpassDescription>,
    dependencies: Vec<SubpassDependency>,
}

impl RenderPassDescription {
    /// Classifies the subpass usages of `attachments` into subpass descriptions.
    ///
    /// The number of subpasses is the number of usages of the first attachment. Every attachment
    /// must declare the same number.
    pub fn from_attachments(
        attachments: Vec<Attachment>,
    ) -> Result<RenderPassDescription, RenderPassCreationError> {
        let subpass_count = attachments
            .first()
            .map_or(0, |attachment| attachment.subpass_usages.len() as u32);

        Self::with_subpass_count(attachments, subpass_count)
    }

    /// Same as `from_attachments`, but with an explicit number of subpasses. This allows
    /// creating subpasses that don't use any attachment.
    pub fn with_subpass_count(
        attachments: Vec<Attachment>,
        subpass_count: u32,
    ) -> Result<RenderPassDescription, RenderPassCreationError> {
        let subpasses = classify(&attachments, subpass_count)?;

        let mut description = RenderPassDescription {
            clear_values: attachments
                .iter()
                .map(Attachment::effective_clear_value)
                .collect(),
            attachments: attachments
                .into_iter()
                .map(|attachment| attachment.description)
                .collect(),
            subpasses,
            dependencies: Vec::new(),
        };
        description.synthesize_dependencies(|_| {});
        description.validate()?;

        Ok(description)
    }

    /// Creates a description from subpasses that were already classified.
    ///
    /// The clear values are derived from the attachment formats.
    pub fn from_descriptions(
        attachments: Vec<AttachmentDescription>,
        subpasses: Vec<SubpassDescription>,
    ) -> Result<RenderPassDescription, RenderPassCreationError> {
        let mut description = RenderPassDescription {
            clear_values: attachments
                .iter()
                .map(|attachment| ClearValue::default_for_format(attachment.format))
                .collect(),
            attachments,
            subpasses,
            dependencies: Vec::new(),
        };
        description.synthesize_dependencies(|_| {});
        description.validate()?;

        Ok(description)
    }

    /// Replaces the dependencies with one dependency from before the render pass into the first
    /// subpass, one between each pair of adjacent subpasses, and one from the last subpass to
    /// after the render pass.
    ///
    /// The default scopes cover all stages and all memory accesses. `sync` is called with each
    /// dependency in that order, and can narrow or replace its scopes.
    pub fn synthesize_dependencies(&mut self, mut sync: impl FnMut(&mut RenderPassSync)) {
        self.dependencies.clear();

        let subpass_count = self.subpasses.len() as u32;
        if subpass_count == 0 {
            return;
        }

        let edges = iter::once((None, Some(0)))
            .chain((1..subpass_count).map(|subpass| (Some(subpass - 1), Some(subpass))))
            .chain(iter::once((Some(subpass_count - 1), None)));

        for (source_subpass, destination_subpass) in edges {
            let mut edge = RenderPassSync::new(source_subpass, destination_subpass);
            sync(&mut edge);
            self.dependencies.push(edge.into());
        }
    }

    /// Checks the structural constraints of the description.
    pub fn validate(&self) -> Result<(), RenderPassCreationError> {
        if self.subpasses.is_empty() {
            return Err(RenderPassCreationError::NoSubpasses);
        }

        if self.clear_values.len() != self.attachments.len() {
            return Err(RenderPassCreationError::ClearValuesLenMismatch {
                clear_values: self.clear_values.len() as u32,
                attachments: self.attachments.len() as u32,
            });
        }

        let attachment_count = self.attachments.len() as u32;

        for (subpass_index, subpass) in (0u32..).zip(&self.subpasses) {
            if subpass.depth_stencil_attachments.len() > 1 {
                return Err(
                    RenderPassCreationError::SubpassMultipleDepthStencilAttachments {
                        subpass: subpass_index,
                        count: subpass.depth_stencil_attachments.len() as u32,
                    },
                );
            }

            let locations = subpass
                .input_attachments
                .len()
                .max(subpass.color_attachments.len()) as u32;
            if locations > MAX_ATTACHMENT_LOCATIONS {
                return Err(RenderPassCreationError::SubpassLocationOutOfRange {
                    subpass: subpass_index,
                    location: locations - 1,
                });
            }

            if !(subpass.resolve_attachments.is_empty()
                || subpass.resolve_attachments.len() == subpass.color_attachments.len())
            {
                return Err(
                    RenderPassCreationError::SubpassResolveAttachmentsColorAttachmentsLenMismatch {
                        subpass: subpass_index,
                        resolve_attachments: subpass.resolve_attachments.len() as u32,
                        color_attachments: subpass.color_attachments.len() as u32,
                    },
                );
            }

            for (location, (resolve, color)) in (0u32..).zip(
                subpass
                    .resolve_attachments
                    .iter()
                    .zip(&subpass.color_attachments),
            ) {
                if resolve.is_some() && color.is_none() {
                    return Err(RenderPassCreationError::SubpassResolveWithoutColorAttachment {
                        subpass: subpass_index,
                        location,
                    });
                }
            }

            if let Some(attachment) = subpass
                .used_attachments()
                .chain(subpass.preserve_attachments.iter().copied())
                .find(|&attachment| attachment >= attachment_count)
            {
                return Err(RenderPassCreationError::SubpassAttachmentOutOfRange {
                    subpass: subpass_index,
                    attachment,
                });
            }

            for attachment in 0..attachment_count {
                let roles = [
                    subpass.is_input_attachment(attachment),
                    subpass.is_color_attachment(attachment),
                    subpass.is_depth_stencil_attachment(attachment),
                    subpass.is_resolve_attachment(attachment),
                ]
                .into_iter()
                .filter(|&role| role)
                .count();

                if roles > 1 {
                    return Err(RenderPassCreationError::SubpassAttachmentMultipleRoles {
                        subpass: subpass_index,
                        attachment,
                    });
                }

                if roles > 0 && subpass.is_preserve_attachment(attachment) {
                    return Err(
                        RenderPassCreationError::SubpassPreserveAttachmentUsedElsewhere {
                            subpass: subpass_index,
                            attachment,
                        },
                    );
                }
            }
        }

        let subpass_count = self.subpasses.len() as u32;

        for (dependency_index, dependency) in (0u32..).zip(&self.dependencies) {
            let (source, destination) = (dependency.source_subpass, dependency.destination_subpass);

            if source.is_none() && destination.is_none() {
                return Err(RenderPassCreationError::DependencyBothSubpassesExternal {
                    dependency: dependency_index,
                });
            }

            if let Some(subpass) = [source, destination]
                .into_iter()
                .flatten()
                .find(|&subpass| subpass >= subpass_count)
            {
                return Err(RenderPassCreationError::DependencySubpassOutOfRange {
                    dependency: dependency_index,
                    subpass,
                });
            }
        }

        Ok(())
    }

    /// Validates the description and creates the native render pass from it.
    pub fn build(
        self,
        device: Arc<dyn RenderPassDevice>,
    ) -> Result<Arc<RenderPass>, RenderPassCreationError> {
        self.validate()?;

        let handle = unsafe { self.create_handle(&*device)? };
        tracing::debug!(
            ?handle,
            attachments = self.attachments.len(),
            subpasses = self.subpasses.len(),
            dependencies = self.dependencies.len(),
            "created render pass",
        );

        Ok(unsafe { RenderPass::from_handle(device, handle, self) })
    }

    unsafe fn create_handle(
        &self,
        device: &dyn RenderPassDevice,
    ) -> Result<vk::RenderPass, VulkanError> {
        let attachments_vk: SmallVec<[_; 4]> = self
            .attachments
            .iter()
            .map(AttachmentDescription::to_vk)
            .collect();

        // One flat list for all subpasses, sliced up below.
        let attachment_references_vk: SmallVec<[_; 8]> = self
            .subpasses
            .iter()
            .flat_map(|subpass| {
                subpass
                    .input_attachments
                    .iter()
                    .chain(&subpass.color_attachments)
                    .chain(&subpass.resolve_attachments)
                    .map(Option::as_ref)
                    .chain(subpass.depth_stencil_attachments.iter().take(1).map(Some))
                    .map(AttachmentReference::to_vk)
            })
            .collect();

        let all_references = attachment_references_vk.as_slice();
        let mut offset = 0;
        let mut next_references = move |len: usize| {
            let references = &all_references[offset..offset + len];
            offset += len;
            references
        };

        let subpasses_vk: SmallVec<[_; 4]> = self
            .subpasses
            .iter()
            .map(|subpass| {
                let input = next_references(subpass.input_attachments.len());
                let color = next_references(subpass.color_attachments.len());
                let resolve = next_references(subpass.resolve_attachments.len());
                let depth_stencil =
                    next_references(subpass.depth_stencil_attachments.len().min(1));

                let mut subpass_vk = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(input)
                    .color_attachments(color)
                    .preserve_attachments(&subpass.preserve_attachments);

                // Also sets the color count, which is equal by validation.
                if !resolve.is_empty() {
                    subpass_vk = subpass_vk.resolve_attachments(resolve);
                }

                if let Some(depth_stencil) = depth_stencil.first() {
                    subpass_vk = subpass_vk.depth_stencil_attachment(depth_stencil);
                }

                subpass_vk
            })
            .collect();

        let dependencies_vk: SmallVec<[_; 4]> = self
            .dependencies
            .iter()
            .map(SubpassDependency::to_vk)
            .collect();

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments_vk)
            .subpasses(&subpasses_vk)
            .dependencies(&dependencies_vk);

        unsafe { device.create_render_pass(&create_info) }
    }

    /// Returns the attachments, in index order.
    #[inline]
    pub fn attachments(&self) -> &[AttachmentDescription] {
        &self.attachments
    }

    #[inline]
    pub fn attachments_mut(&mut self) -> &mut Vec<AttachmentDescription> {
        &mut self.attachments
    }

    /// Returns the clear values, one per attachment.
    #[inline]
    pub fn clear_values(&self) -> &[ClearValue] {
        &self.clear_values
    }

    #[inline]
    pub fn clear_values_mut(&mut self) -> &mut Vec<ClearValue> {
        &mut self.clear_values
    }

    /// Returns the clear values in the form `vkCmdBeginRenderPass` takes them.
    pub fn clear_values_vk(&self) -> Vec<vk::ClearValue> {
        self.clear_values.iter().map(|&value| value.into()).collect()
    }

    #[inline]
    pub fn subpasses(&self) -> &[SubpassDescription] {
        &self.subpasses
    }

    #[inline]
    pub fn subpasses_mut(&mut self) -> &mut Vec<SubpassDescription> {
        &mut self.subpasses
    }

    #[inline]
    pub fn dependencies(&self) -> &[SubpassDependency] {
        &self.dependencies
    }

    #[inline]
    pub fn dependencies_mut(&mut self) -> &mut Vec<SubpassDependency> {
        &mut self.dependencies
    }

    /// Returns whether `attachment` is an input attachment of `subpass`.
    ///
    /// Returns `false` if `subpass` doesn't exist. The same goes for the other role queries.
    #[inline]
    pub fn is_input_attachment(&self, subpass: u32, attachment: u32) -> bool {
        self.subpasses
            .get(subpass as usize)
            .is_some_and(|subpass| subpass.is_input_attachment(attachment))
    }

    #[inline]
    pub fn is_color_attachment(&self, subpass: u32, attachment: u32) -> bool {
        self.subpasses
            .get(subpass as usize)
            .is_some_and(|subpass| subpass.is_color_attachment(attachment))
    }

    #[inline]
    pub fn is_depth_stencil_attachment(&self, subpass: u32, attachment: u32) -> bool {
        self.subpasses
            .get(subpass as usize)
            .is_some_and(|subpass| subpass.is_depth_stencil_attachment(attachment))
    }

    #[inline]
    pub fn is_resolve_attachment(&self, subpass: u32, attachment: u32) -> bool {
        self.subpasses
            .get(subpass as usize)
            .is_some_and(|subpass| subpass.is_resolve_attachment(attachment))
    }

    #[inline]
    pub fn is_preserve_attachment(&self, subpass: u32, attachment: u32) -> bool {
        self.subpasses
            .get(subpass as usize)
            .is_some_and(|subpass| subpass.is_preserve_attachment(attachment))
    }

    /// Returns the input attachments of `subpass`, by location.
    ///
    /// # Panics
    ///
    /// - Panics if `subpass` doesn't exist. The same goes for the other per-subpass accessors.
    #[inline]
    pub fn input_attachments_for_subpass(&self, subpass: u32) -> &[Option<AttachmentReference>] {
        &self.subpass(subpass).input_attachments
    }

    #[inline]
    pub fn color_attachments_for_subpass(&self, subpass: u32) -> &[Option<AttachmentReference>] {
        &self.subpass(subpass).color_attachments
    }

    #[inline]
    pub fn depth_stencil_attachments_for_subpass(&self, subpass: u32) -> &[AttachmentReference] {
        &self.subpass(subpass).depth_stencil_attachments
    }

    #[inline]
    pub fn resolve_attachments_for_subpass(&self, subpass: u32) -> &[Option<AttachmentReference>] {
        &self.subpass(subpass).resolve_attachments
    }

    #[inline]
    pub fn preserve_attachments_for_subpass(&self, subpass: u32) -> &[u32] {
        &self.subpass(subpass).preserve_attachments
    }

    fn subpass(&self, subpass: u32) -> &SubpassDescription {
        self.subpasses.get(subpass as usize).unwrap_or_else(|| {
            panic!(
                "subpass index {} is out of range for a render pass with {} subpasses",
                subpass,
                self.subpasses.len(),
            )
        })
    }
}

fn classify(
    attachments: &[Attachment],
    subpass_count: u32,
) -> Result<Vec<SubpassDescription>, RenderPassCreationError> {
    for (attachment_index, attachment) in (0u32..).zip(attachments) {
        if attachment.subpass_usages.len() != subpass_count as usize {
            return Err(RenderPassCreationError::SubpassUsagesLenMismatch {
                attachment: attachment_index,
                usages: attachment.subpass_usages.len() as u32,
                subpasses: subpass_count,
            });
        }
    }

    let attachment_count = attachments.len() as u32;

    (0..subpass_count)
        .map(|subpass_index| -> Result<SubpassDescription, RenderPassCreationError> {
            let mut subpass = SubpassDescription::default();

            for (attachment_index, attachment) in (0u32..).zip(attachments) {
                match attachment.subpass_usages[subpass_index as usize] {
                    SubpassUsage::Unused => (),
                    SubpassUsage::Input { location } => place(
                        &mut subpass.input_attachments,
                        subpass_index,
                        location,
                        AttachmentReference::new(
                            attachment_index,
                            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        ),
                    )?,
                    SubpassUsage::Color {
                        location,
                        resolve_to,
                    } => {
                        place(
                            &mut subpass.color_attachments,
                            subpass_index,
                            location,
                            AttachmentReference::new(
                                attachment_index,
                                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                            ),
                        )?;

                        if let Some(target) = resolve_to {
                            if target >= attachment_count {
                                return Err(RenderPassCreationError::SubpassAttachmentOutOfRange {
                                    subpass: subpass_index,
                                    attachment: target,
                                });
                            }

                            place(
                                &mut subpass.resolve_attachments,
                                subpass_index,
                                location,
                                AttachmentReference::new(
                                    target,
                                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                                ),
                            )?;
                        }
                    }
                    SubpassUsage::DepthStencil => subpass.depth_stencil_attachments.push(
                        AttachmentReference::new(
                            attachment_index,
                            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                        ),
                    ),
                    SubpassUsage::Preserve => subpass.preserve_attachments.push(attachment_index),
                }
            }

            // Resolves pair with colors by position.
            if !subpass.resolve_attachments.is_empty() {
                let color_count = subpass.color_attachments.len();
                subpass.resolve_attachments.resize(color_count, None);
            }

            Ok(subpass)
        })
        .collect()
}

fn place(
    references: &mut Vec<Option<AttachmentReference>>,
    subpass: u32,
    location: u32,
    reference: AttachmentReference,
) -> Result<(), RenderPassCreationError> {
    if location >= MAX_ATTACHMENT_LOCATIONS {
        return Err(RenderPassCreationError::SubpassLocationOutOfRange { subpass, location });
    }

    let index = location as usize;

    if references.len() <= index {
        references.resize(index + 1, None);
    }

    if references[index].is_some() {
        return Err(RenderPassCreationError::SubpassLocationConflict { subpass, location });
    }

    references[index] = Some(reference);

    Ok(())
}

/// The synchronization parameters of one dependency that is being synthesized.
///
/// The subpasses the dependency connects are fixed. The scopes can be changed freely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPassSync {
    source_subpass: Option<u32>,
    destination_subpass: Option<u32>,

    /// The default value is `ALL_COMMANDS` for a dependency from before the render pass, and
    /// `ALL_GRAPHICS` otherwise.
    pub source_stages: vk::PipelineStageFlags,

    /// The default value is `ALL_COMMANDS` for a dependency to after the render pass, and
    /// `ALL_GRAPHICS` otherwise.
    pub destination_stages: vk::PipelineStageFlags,

    /// The default value is `MEMORY_READ | MEMORY_WRITE`.
    pub source_access: vk::AccessFlags,

    /// The default value is `MEMORY_READ | MEMORY_WRITE`.
    pub destination_access: vk::AccessFlags,

    /// The default value is `false`.
    pub by_region: bool,
}

impl RenderPassSync {
    fn new(source_subpass: Option<u32>, destination_subpass: Option<u32>) -> Self {
        let stages = |subpass: Option<u32>| match subpass {
            Some(_) => vk::PipelineStageFlags::ALL_GRAPHICS,
            None => vk::PipelineStageFlags::ALL_COMMANDS,
        };
        let access = vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE;

        RenderPassSync {
            source_subpass,
            destination_subpass,
            source_stages: stages(source_subpass),
            destination_stages: stages(destination_subpass),
            source_access: access,
            destination_access: access,
            by_region: false,
        }
    }

    /// Returns whether this is the dependency on the commands before the render pass.
    #[inline]
    pub fn is_external_pre_sync(&self) -> bool {
        self.source_subpass.is_none()
    }

    /// Returns whether this is the dependency of the commands after the render pass.
    #[inline]
    pub fn is_external_post_sync(&self) -> bool {
        self.destination_subpass.is_none()
    }

    /// Returns the source subpass, or `None` before the render pass.
    #[inline]
    pub fn source_subpass_id(&self) -> Option<u32> {
        self.source_subpass
    }

    /// Returns the destination subpass, or `None` after the render pass.
    #[inline]
    pub fn destination_subpass_id(&self) -> Option<u32> {
        self.destination_subpass
    }
}

impl From<RenderPassSync> for SubpassDependency {
    #[inline]
    fn from(val: RenderPassSync) -> Self {
        SubpassDependency {
            source_subpass: val.source_subpass,
            destination_subpass: val.destination_subpass,
            source_stages: val.source_stages,
            destination_stages: val.destination_stages,
            source_access: val.source_access,
            destination_access: val.destination_access,
            by_region: val.by_region,
            ..Default::default()
        }
    }
}

/// Error that can happen when creating a `RenderPass`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderPassCreationError {
    /// Not enough memory.
    OomError(OomError),

    /// The driver rejected the render pass.
    VulkanError(VulkanError),

    /// There are no subpasses.
    NoSubpasses,

    /// An attachment doesn't declare one usage per subpass.
    SubpassUsagesLenMismatch {
        attachment: u32,
        usages: u32,
        subpasses: u32,
    },

    /// A subpass has more than one depth/stencil attachment.
    SubpassMultipleDepthStencilAttachments { subpass: u32, count: u32 },

    /// A subpass has resolve attachments, but not as many as it has color attachments.
    SubpassResolveAttachmentsColorAttachmentsLenMismatch {
        subpass: u32,
        resolve_attachments: u32,
        color_attachments: u32,
    },

    /// A subpass resolves into an attachment at a location that has no color attachment.
    SubpassResolveWithoutColorAttachment { subpass: u32, location: u32 },

    /// A subpass references an attachment that doesn't exist.
    SubpassAttachmentOutOfRange { subpass: u32, attachment: u32 },

    /// A subpass uses an attachment in more than one role.
    SubpassAttachmentMultipleRoles { subpass: u32, attachment: u32 },

    /// A subpass preserves an attachment that it also uses.
    SubpassPreserveAttachmentUsedElsewhere { subpass: u32, attachment: u32 },

    /// Two attachments of a subpass were declared at the same input or color location.
    SubpassLocationConflict { subpass: u32, location: u32 },

    /// An input or color location is not below [`MAX_ATTACHMENT_LOCATIONS`].
    SubpassLocationOutOfRange { subpass: u32, location: u32 },

    /// An attachment is listed more than once in the same role of a subpass.
    SubpassAttachmentRepeated { subpass: u32, attachment: u32 },

    /// The number of clear values differs from the number of attachments.
    ClearValuesLenMismatch { clear_values: u32, attachments: u32 },

    /// A dependency references a subpass that doesn't exist.
    DependencySubpassOutOfRange { dependency: u32, subpass: u32 },

    /// A dependency has both its source and destination external to the render pass.
    DependencyBothSubpassesExternal { dependency: u32 },
}

impl Error for RenderPassCreationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::OomError(err) => Some(err),
            Self::VulkanError(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for RenderPassCreationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::OomError(_) => write!(f, "not enough memory available"),
            Self::VulkanError(_) => write!(f, "the driver rejected the render pass"),
            Self::NoSubpasses => write!(f, "the render pass has no subpasses"),
            Self::SubpassUsagesLenMismatch {
                attachment,
                usages,
                subpasses,
            } => write!(
                f,
                "attachment {} declares {} subpass usages, but the render pass has {} subpasses",
                attachment, usages, subpasses,
            ),
            Self::SubpassMultipleDepthStencilAttachments { subpass, count } => write!(
                f,
                "subpass {} has {} depth/stencil attachments, but at most one is allowed",
                subpass, count,
            ),
            Self::SubpassResolveAttachmentsColorAttachmentsLenMismatch {
                subpass,
                resolve_attachments,
                color_attachments,
            } => write!(
                f,
                "subpass {} has {} resolve attachments, which is neither zero nor the number of \
                color attachments ({})",
                subpass, resolve_attachments, color_attachments,
            ),
            Self::SubpassResolveWithoutColorAttachment { subpass, location } => write!(
                f,
                "subpass {} has a resolve attachment at location {}, but no color attachment there",
                subpass, location,
            ),
            Self::SubpassAttachmentOutOfRange {
                subpass,
                attachment,
            } => write!(
                f,
                "subpass {} references attachment {}, which doesn't exist",
                subpass, attachment,
            ),
            Self::SubpassAttachmentMultipleRoles {
                subpass,
                attachment,
            } => write!(
                f,
                "subpass {} uses attachment {} in more than one role",
                subpass, attachment,
            ),
            Self::SubpassPreserveAttachmentUsedElsewhere {
                subpass,
                attachment,
            } => write!(
                f,
                "subpass {} preserves attachment {}, but also uses it",
                subpass, attachment,
            ),
            Self::SubpassLocationConflict { subpass, location } => write!(
                f,
                "subpass {} has two attachments at location {}",
                subpass, location,
            ),
            Self::SubpassLocationOutOfRange { subpass, location } => write!(
                f,
                "subpass {} uses location {}, but locations must be less than {}",
                subpass, location, MAX_ATTACHMENT_LOCATIONS,
            ),
            Self::SubpassAttachmentRepeated {
                subpass,
                attachment,
            } => write!(
                f,
                "subpass {} lists attachment {} more than once",
                subpass, attachment,
            ),
            Self::ClearValuesLenMismatch {
                clear_values,
                attachments,
            } => write!(
                f,
                "there are {} clear values for {} attachments",
                clear_values, attachments,
            ),
            Self::DependencySubpassOutOfRange {
                dependency,
                subpass,
            } => write!(
                f,
                "dependency {} references subpass {}, which doesn't exist",
                dependency, subpass,
            ),
            Self::DependencyBothSubpassesExternal { dependency } => write!(
                f,
                "dependency {} has both its source and destination outside the render pass",
                dependency,
            ),
        }
    }
}

impl From<OomError> for RenderPassCreationError {
    #[inline]
    fn from(err: OomError) -> RenderPassCreationError {
        Self::OomError(err)
    }
}

impl From<VulkanError> for RenderPassCreationError {
    #[inline]
    fn from(err: VulkanError) -> RenderPassCreationError {
        if err.is_oom() {
            Self::OomError(err.into())
        } else {
            Self::VulkanError(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RenderPassCreationError, RenderPassDescription, MAX_ATTACHMENT_LOCATIONS};
    use crate::{
        format::ClearValue,
        render_pass::{
            Attachment, AttachmentDescription, AttachmentReference, LoadOp, RenderPass, StoreOp,
            SubpassDescription, SubpassUsage,
        },
        tests::FakeDevice,
        OomError, VulkanError, VulkanObject,
    };
    use ash::vk;
    use std::sync::Arc;

    fn color(usages: impl IntoIterator<Item = SubpassUsage>) -> Attachment {
        Attachment::declare(
            vk::Format::R8G8B8A8_UNORM,
            LoadOp::Clear,
            StoreOp::Store,
            usages,
        )
    }

    fn depth(usages: impl IntoIterator<Item = SubpassUsage>) -> Attachment {
        Attachment::declare(
            vk::Format::D32_SFLOAT,
            LoadOp::Clear,
            StoreOp::DontCare,
            usages,
        )
    }

    #[test]
    fn color_and_depth() {
        let device = Arc::new(FakeDevice::new());
        let render_pass = RenderPass::new(
            device.clone(),
            vec![
                color([SubpassUsage::color(0)]),
                depth([SubpassUsage::DepthStencil]),
            ],
        )
        .unwrap();

        assert!(render_pass.is_color_attachment(0, 0));
        assert!(render_pass.is_depth_stencil_attachment(0, 1));
        assert!(!render_pass.is_input_attachment(0, 0));

        let dependencies = render_pass.dependencies();
        assert_eq!(dependencies.len(), 2);
        assert_eq!(dependencies[0].source_subpass, None);
        assert_eq!(dependencies[0].destination_subpass, Some(0));
        assert_eq!(dependencies[1].source_subpass, Some(0));
        assert_eq!(dependencies[1].destination_subpass, None);

        let created = device.created();
        assert_eq!(created.len(), 1);
        let raw = &created[0];
        assert_eq!(raw.attachments.len(), 2);
        assert_eq!(raw.attachments[1].format, vk::Format::D32_SFLOAT);
        assert_eq!(raw.subpasses.len(), 1);
        assert_eq!(raw.subpasses[0].color.len(), 1);
        assert_eq!(raw.subpasses[0].color[0].attachment, 0);
        assert!(raw.subpasses[0].resolve.is_empty());
        assert_eq!(
            raw.subpasses[0].depth_stencil.map(|r| r.attachment),
            Some(1)
        );
        assert_eq!(raw.dependencies.len(), 2);
        assert_eq!(raw.dependencies[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(raw.dependencies[1].dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(raw.handle, render_pass.handle());
    }

    #[test]
    fn default_dependency_count() {
        for subpass_count in 1..6u32 {
            let usages = (0..subpass_count).map(|_| SubpassUsage::color(0));
            let description = RenderPassDescription::from_attachments(vec![color(usages)]).unwrap();
            let dependencies = description.dependencies();

            assert_eq!(dependencies.len(), subpass_count as usize + 1);
            assert_eq!(dependencies[0].source_subpass, None);
            assert_eq!(dependencies[0].destination_subpass, Some(0));
            for subpass in 1..subpass_count {
                let dependency = &dependencies[subpass as usize];
                assert_eq!(dependency.source_subpass, Some(subpass - 1));
                assert_eq!(dependency.destination_subpass, Some(subpass));
                assert_eq!(
                    dependency.source_stages,
                    vk::PipelineStageFlags::ALL_GRAPHICS
                );
            }
            let last = dependencies.last().unwrap();
            assert_eq!(last.source_subpass, Some(subpass_count - 1));
            assert_eq!(last.destination_subpass, None);
            assert_eq!(last.destination_stages, vk::PipelineStageFlags::ALL_COMMANDS);
            assert!(dependencies.iter().all(|d| d.source_access
                == vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE));
        }
    }

    #[test]
    fn sync_customizer() {
        let device = Arc::new(FakeDevice::new());
        let mut visited = Vec::new();

        let render_pass = RenderPass::create(
            device,
            vec![
                color([SubpassUsage::color(0), SubpassUsage::input(0)]),
                color([SubpassUsage::Unused, SubpassUsage::color(0)]),
            ],
            |sync| {
                visited.push((
                    sync.is_external_pre_sync(),
                    sync.is_external_post_sync(),
                    sync.source_subpass_id(),
                    sync.destination_subpass_id(),
                ));

                if sync.source_subpass_id() == Some(0) && sync.destination_subpass_id() == Some(1)
                {
                    sync.source_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
                    sync.destination_stages = vk::PipelineStageFlags::FRAGMENT_SHADER;
                    sync.source_access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
                    sync.destination_access = vk::AccessFlags::INPUT_ATTACHMENT_READ;
                    sync.by_region = true;
                }
            },
            |_| {},
        )
        .unwrap();

        assert_eq!(
            visited,
            [
                (true, false, None, Some(0)),
                (false, false, Some(0), Some(1)),
                (false, true, Some(1), None),
            ]
        );

        let middle = &render_pass.dependencies()[1];
        assert_eq!(
            middle.source_stages,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(
            middle.destination_access,
            vk::AccessFlags::INPUT_ATTACHMENT_READ
        );
        assert!(middle.by_region);
        assert!(!render_pass.dependencies()[0].by_region);
    }

    #[test]
    fn alter_before_creation() {
        let device = Arc::new(FakeDevice::new());
        let render_pass = RenderPass::create(
            device.clone(),
            vec![color([SubpassUsage::color(0)])],
            |_| {},
            |description| {
                description.attachments_mut()[0].final_layout =
                    vk::ImageLayout::PRESENT_SRC_KHR;
                description.clear_values_mut()[0] = ClearValue::Float([1.0; 4]);
            },
        )
        .unwrap();

        assert_eq!(
            render_pass.attachments()[0].final_layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
        assert_eq!(
            device.created()[0].attachments[0].final_layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
        assert_eq!(render_pass.clear_values()[0], ClearValue::Float([1.0; 4]));
    }

    #[test]
    fn invalid_alteration_is_rejected() {
        let device = Arc::new(FakeDevice::new());
        let result = RenderPass::create(
            device.clone(),
            vec![
                color([SubpassUsage::color(0)]),
                depth([SubpassUsage::DepthStencil]),
            ],
            |_| {},
            |description| {
                let extra = AttachmentReference::new(
                    0,
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                );
                description.subpasses_mut()[0]
                    .depth_stencil_attachments
                    .push(extra);
            },
        );

        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassMultipleDepthStencilAttachments {
                subpass: 0,
                count: 2,
            }
        );
        assert!(device.created().is_empty());
    }

    #[test]
    fn multiple_depth_stencil_attachments() {
        let result = RenderPassDescription::from_attachments(vec![
            depth([SubpassUsage::DepthStencil]),
            depth([SubpassUsage::DepthStencil]),
        ]);

        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassMultipleDepthStencilAttachments {
                subpass: 0,
                count: 2,
            }
        );
    }

    #[test]
    fn resolve_len_mismatch() {
        let color_ref = |attachment| {
            Some(AttachmentReference::new(
                attachment,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ))
        };
        let attachments = vec![AttachmentDescription::default(); 3];
        let subpass = SubpassDescription {
            color_attachments: vec![color_ref(0), color_ref(1)],
            resolve_attachments: vec![color_ref(2)],
            ..Default::default()
        };

        let result = RenderPassDescription::from_descriptions(attachments, vec![subpass]);
        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassResolveAttachmentsColorAttachmentsLenMismatch {
                subpass: 0,
                resolve_attachments: 1,
                color_attachments: 2,
            }
        );
    }

    #[test]
    fn resolve_without_color() {
        let color_ref = |attachment| {
            Some(AttachmentReference::new(
                attachment,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ))
        };
        let attachments = vec![AttachmentDescription::default(); 2];
        let subpass = SubpassDescription {
            color_attachments: vec![None, color_ref(0)],
            resolve_attachments: vec![color_ref(1), None],
            ..Default::default()
        };

        let result = RenderPassDescription::from_descriptions(attachments, vec![subpass]);
        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassResolveWithoutColorAttachment {
                subpass: 0,
                location: 0,
            }
        );
    }

    #[test]
    fn direct_attachment_out_of_range() {
        let attachments = vec![AttachmentDescription::default(); 2];

        let color = SubpassDescription {
            color_attachments: vec![Some(AttachmentReference::new(
                3,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ))],
            ..Default::default()
        };
        let result = RenderPassDescription::from_descriptions(attachments.clone(), vec![color]);
        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassAttachmentOutOfRange {
                subpass: 0,
                attachment: 3,
            }
        );

        let input = SubpassDescription {
            input_attachments: vec![Some(AttachmentReference::new(
                2,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ))],
            ..Default::default()
        };
        let result = RenderPassDescription::from_descriptions(attachments.clone(), vec![input]);
        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassAttachmentOutOfRange {
                subpass: 0,
                attachment: 2,
            }
        );

        let preserve = SubpassDescription {
            preserve_attachments: vec![5],
            ..Default::default()
        };
        let result = RenderPassDescription::from_descriptions(attachments, vec![preserve]);
        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassAttachmentOutOfRange {
                subpass: 0,
                attachment: 5,
            }
        );
    }

    #[test]
    fn location_out_of_range() {
        let result =
            RenderPassDescription::from_attachments(vec![color([SubpassUsage::color(100_000_000)])]);
        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassLocationOutOfRange {
                subpass: 0,
                location: 100_000_000,
            }
        );

        let result = RenderPassDescription::from_attachments(vec![color([SubpassUsage::Input {
            location: MAX_ATTACHMENT_LOCATIONS,
        }])]);
        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassLocationOutOfRange {
                subpass: 0,
                location: MAX_ATTACHMENT_LOCATIONS,
            }
        );

        let description = RenderPassDescription::from_attachments(vec![color([
            SubpassUsage::color(MAX_ATTACHMENT_LOCATIONS - 1),
        ])])
        .unwrap();
        assert_eq!(
            description.color_attachments_for_subpass(0).len(),
            MAX_ATTACHMENT_LOCATIONS as usize
        );
    }

    #[test]
    fn direct_location_out_of_range() {
        let attachments = vec![AttachmentDescription::default(); 1];
        let subpass = SubpassDescription {
            color_attachments: vec![None; MAX_ATTACHMENT_LOCATIONS as usize + 1],
            ..Default::default()
        };

        let result = RenderPassDescription::from_descriptions(attachments, vec![subpass]);
        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassLocationOutOfRange {
                subpass: 0,
                location: MAX_ATTACHMENT_LOCATIONS,
            }
        );
    }

    #[test]
    fn resolve_is_positional() {
        let device = Arc::new(FakeDevice::new());
        let render_pass = RenderPass::new(
            device.clone(),
            vec![
                color([SubpassUsage::color(1)]),
                color([SubpassUsage::color_resolved(0, 2)])
                    .with_samples(vk::SampleCountFlags::TYPE_4),
                color([SubpassUsage::Unused]),
            ],
        )
        .unwrap();

        let colors = render_pass.color_attachments_for_subpass(0);
        assert_eq!(colors.len(), 2);
        assert_eq!(colors[0].unwrap().attachment, 1);
        assert_eq!(colors[1].unwrap().attachment, 0);

        let resolves = render_pass.resolve_attachments_for_subpass(0);
        assert_eq!(resolves.len(), 2);
        assert_eq!(resolves[0].unwrap().attachment, 2);
        assert!(resolves[1].is_none());

        assert!(render_pass.is_resolve_attachment(0, 2));
        assert!(!render_pass.is_color_attachment(0, 2));

        let raw = &device.created()[0].subpasses[0];
        assert_eq!(raw.resolve.len(), 2);
        assert_eq!(raw.resolve[0].attachment, 2);
        assert_eq!(raw.resolve[1].attachment, vk::ATTACHMENT_UNUSED);
    }

    #[test]
    fn location_gaps_are_unused() {
        let description = RenderPassDescription::from_attachments(vec![
            color([SubpassUsage::color(2)]),
            color([SubpassUsage::input(1)]),
        ])
        .unwrap();

        let colors = description.color_attachments_for_subpass(0);
        assert_eq!(colors.len(), 3);
        assert!(colors[0].is_none() && colors[1].is_none());
        assert_eq!(colors[2].unwrap().attachment, 0);

        let inputs = description.input_attachments_for_subpass(0);
        assert_eq!(inputs.len(), 2);
        assert_eq!(
            inputs[1].unwrap().layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn location_conflict() {
        let result = RenderPassDescription::from_attachments(vec![
            color([SubpassUsage::color(0)]),
            color([SubpassUsage::color(0)]),
        ]);

        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassLocationConflict {
                subpass: 0,
                location: 0,
            }
        );
    }

    #[test]
    fn usages_len_mismatch() {
        let result = RenderPassDescription::from_attachments(vec![
            color([SubpassUsage::color(0), SubpassUsage::color(0)]),
            depth([SubpassUsage::DepthStencil]),
        ]);

        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassUsagesLenMismatch {
                attachment: 1,
                usages: 1,
                subpasses: 2,
            }
        );
    }

    #[test]
    fn no_subpasses() {
        assert_eq!(
            RenderPassDescription::from_attachments(Vec::new()).unwrap_err(),
            RenderPassCreationError::NoSubpasses
        );
    }

    #[test]
    fn subpass_without_attachments() {
        let description = RenderPassDescription::with_subpass_count(Vec::new(), 1).unwrap();
        assert_eq!(description.subpasses().len(), 1);
        assert_eq!(description.dependencies().len(), 2);
    }

    #[test]
    fn resolve_target_out_of_range() {
        let result =
            RenderPassDescription::from_attachments(vec![color([SubpassUsage::color_resolved(
                0, 5,
            )])]);

        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassAttachmentOutOfRange {
                subpass: 0,
                attachment: 5,
            }
        );
    }

    #[test]
    fn resolve_target_used_as_color() {
        let result = RenderPassDescription::from_attachments(vec![
            color([SubpassUsage::color_resolved(0, 1)]),
            color([SubpassUsage::color(1)]),
        ]);

        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::SubpassAttachmentMultipleRoles {
                subpass: 0,
                attachment: 1,
            }
        );
    }

    #[test]
    fn preserve_used_elsewhere() {
        let mut description = RenderPassDescription::from_attachments(vec![color([
            SubpassUsage::color(0),
        ])])
        .unwrap();
        description.subpasses_mut()[0].preserve_attachments.push(0);

        assert_eq!(
            description.validate().unwrap_err(),
            RenderPassCreationError::SubpassPreserveAttachmentUsedElsewhere {
                subpass: 0,
                attachment: 0,
            }
        );
    }

    #[test]
    fn roles_are_exclusive() {
        let description = RenderPassDescription::from_attachments(vec![
            color([SubpassUsage::color(0), SubpassUsage::input(0)]),
            color([SubpassUsage::color_resolved(1, 2), SubpassUsage::Preserve]),
            color([SubpassUsage::Unused, SubpassUsage::color(0)]),
            depth([SubpassUsage::DepthStencil, SubpassUsage::DepthStencil]),
        ])
        .unwrap();

        for subpass in 0..2 {
            for attachment in 0..4 {
                let roles = [
                    description.is_input_attachment(subpass, attachment),
                    description.is_color_attachment(subpass, attachment),
                    description.is_depth_stencil_attachment(subpass, attachment),
                    description.is_resolve_attachment(subpass, attachment),
                    description.is_preserve_attachment(subpass, attachment),
                ];
                assert!(roles.iter().filter(|&&role| role).count() <= 1);

                let in_colors = description
                    .color_attachments_for_subpass(subpass)
                    .iter()
                    .flatten()
                    .any(|reference| reference.attachment == attachment);
                assert_eq!(
                    description.is_color_attachment(subpass, attachment),
                    in_colors
                );
            }
        }

        assert!(description.is_preserve_attachment(1, 1));
        assert_eq!(description.preserve_attachments_for_subpass(1), [1]);
        assert!(description.is_input_attachment(1, 0));
        assert_eq!(description.depth_stencil_attachments_for_subpass(1).len(), 1);
    }

    #[test]
    fn dependency_validation() {
        let mut description =
            RenderPassDescription::from_attachments(vec![color([SubpassUsage::color(0)])])
                .unwrap();

        description.dependencies_mut()[0].destination_subpass = Some(3);
        assert_eq!(
            description.validate().unwrap_err(),
            RenderPassCreationError::DependencySubpassOutOfRange {
                dependency: 0,
                subpass: 3,
            }
        );

        description.dependencies_mut()[0].destination_subpass = None;
        assert_eq!(
            description.validate().unwrap_err(),
            RenderPassCreationError::DependencyBothSubpassesExternal { dependency: 0 }
        );
    }

    #[test]
    fn clear_values_len_mismatch() {
        let mut description =
            RenderPassDescription::from_attachments(vec![color([SubpassUsage::color(0)])])
                .unwrap();
        description.clear_values_mut().push(ClearValue::Depth(1.0));

        assert_eq!(
            description.validate().unwrap_err(),
            RenderPassCreationError::ClearValuesLenMismatch {
                clear_values: 2,
                attachments: 1,
            }
        );
    }

    #[test]
    fn derived_clear_values() {
        let description = RenderPassDescription::from_attachments(vec![
            color([SubpassUsage::color(0)]),
            depth([SubpassUsage::DepthStencil]),
            Attachment::declare(
                vk::Format::R32_UINT,
                LoadOp::Clear,
                StoreOp::Store,
                [SubpassUsage::color(1)],
            )
            .with_clear_value([7u32, 0, 0, 0]),
        ])
        .unwrap();

        assert_eq!(
            description.clear_values(),
            [
                ClearValue::Float([0.0; 4]),
                ClearValue::Depth(1.0),
                ClearValue::Uint([7, 0, 0, 0]),
            ]
        );
        assert_eq!(description.clear_values_vk().len(), 3);
    }

    #[test]
    fn out_of_range_queries() {
        let description =
            RenderPassDescription::from_attachments(vec![color([SubpassUsage::color(0)])])
                .unwrap();

        assert!(!description.is_color_attachment(1, 0));
        assert!(!description.is_preserve_attachment(7, 0));

        assert_should_panic!("out of range", {
            description.color_attachments_for_subpass(1);
        });
    }

    #[test]
    fn driver_error() {
        let device = Arc::new(FakeDevice::new());
        device.fail_next(VulkanError::OutOfHostMemory);

        let result = RenderPass::new(device.clone(), vec![color([SubpassUsage::color(0)])]);
        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::OomError(OomError::OutOfHostMemory)
        );

        device.fail_next(VulkanError::FormatNotSupported);
        let result = RenderPass::new(device.clone(), vec![color([SubpassUsage::color(0)])]);
        assert_eq!(
            result.unwrap_err(),
            RenderPassCreationError::VulkanError(VulkanError::FormatNotSupported)
        );
        assert_eq!(device.live_render_passes(), 0);
    }

    #[test]
    fn drop_destroys_handle() {
        let device = Arc::new(FakeDevice::new());
        let render_pass =
            RenderPass::new(device.clone(), vec![color([SubpassUsage::color(0)])]).unwrap();
        assert_eq!(device.live_render_passes(), 1);

        drop(render_pass);
        assert_eq!(device.live_render_passes(), 0);
    }

    #[test]
    fn rebuild_from_description() {
        let device = Arc::new(FakeDevice::new());
        let first =
            RenderPass::new(device.clone(), vec![color([SubpassUsage::color(0)])]).unwrap();

        let mut description = first.to_description();
        description.attachments_mut()[0].store_op = StoreOp::DontCare;
        let second = description.build(device.clone()).unwrap();

        assert_ne!(first.handle(), second.handle());
        assert_eq!(first.attachments()[0].store_op, StoreOp::Store);
        assert_eq!(second.attachments()[0].store_op, StoreOp::DontCare);
        assert_eq!(first.subpasses(), second.subpasses());
        assert_eq!(device.live_render_passes(), 2);
    }
}
