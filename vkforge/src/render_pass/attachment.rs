// Copyright (c) 2024 The vkforge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{AttachmentDescription, LoadOp, StoreOp};
use crate::format::{format_aspects, is_depth_stencil_format, ClearValue};
use ash::vk;

/// How an attachment is used in one subpass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubpassUsage {
    /// The attachment is not used, and its content may be discarded.
    Unused,

    /// The attachment is read as an input attachment at `location`.
    Input { location: u32 },

    /// The attachment is written as a color attachment at `location`.
    ///
    /// If `resolve_to` is `Some`, the attachment is multisampled and is resolved into the
    /// attachment with that index at the end of the subpass.
    Color {
        location: u32,
        resolve_to: Option<u32>,
    },

    /// The attachment is the depth/stencil attachment.
    DepthStencil,

    /// The attachment is not used, but its content must be preserved for a later subpass.
    Preserve,
}

impl SubpassUsage {
    /// Shorthand for a color usage that isn't resolved.
    #[inline]
    pub const fn color(location: u32) -> Self {
        SubpassUsage::Color {
            location,
            resolve_to: None,
        }
    }

    /// Shorthand for a color usage that is resolved into `attachment`.
    #[inline]
    pub const fn color_resolved(location: u32, attachment: u32) -> Self {
        SubpassUsage::Color {
            location,
            resolve_to: Some(attachment),
        }
    }

    #[inline]
    pub const fn input(location: u32) -> Self {
        SubpassUsage::Input { location }
    }

    /// Returns whether the attachment is read or written by the subpass.
    #[inline]
    pub fn is_used(&self) -> bool {
        !matches!(self, SubpassUsage::Unused | SubpassUsage::Preserve)
    }

    /// Returns the layout the attachment has while it is used in this way, or `None` if the
    /// attachment is not used.
    pub fn layout(&self) -> Option<vk::ImageLayout> {
        match self {
            SubpassUsage::Input { .. } => Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            SubpassUsage::Color { .. } => Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            SubpassUsage::DepthStencil => Some(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            SubpassUsage::Unused | SubpassUsage::Preserve => None,
        }
    }
}

/// An attachment together with the way each subpass of the render pass uses it.
///
/// This is the input of [`RenderPassDescription::from_attachments`]: the position of an
/// attachment in the list is its index, and the position of a usage in `subpass_usages` is the
/// index of the subpass it applies to.
///
/// [`RenderPassDescription::from_attachments`]: super::RenderPassDescription::from_attachments
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    /// The description of the attachment.
    pub description: AttachmentDescription,

    /// The value the attachment is cleared to when its load op is [`LoadOp::Clear`].
    ///
    /// If `None`, the value is derived from the format: depth is cleared to `1.0`, stencil to
    /// `0`, and color to zero.
    pub clear_value: Option<ClearValue>,

    /// The usage of the attachment in each subpass.
    pub subpass_usages: Vec<SubpassUsage>,
}

impl Attachment {
    /// Declares an attachment of `format` with one usage per subpass.
    ///
    /// The layouts are derived from the usages. The attachment starts out undefined unless it is
    /// loaded, in which case it is expected in the layout of its first use. It ends up in the
    /// layout of its last use. The stencil ops follow `load_op` and `store_op` if the format has a
    /// stencil aspect.
    pub fn declare(
        format: vk::Format,
        load_op: LoadOp,
        store_op: StoreOp,
        subpass_usages: impl IntoIterator<Item = SubpassUsage>,
    ) -> Self {
        let subpass_usages: Vec<_> = subpass_usages.into_iter().collect();

        let mut layouts = subpass_usages.iter().filter_map(SubpassUsage::layout);
        let first_layout = layouts.next();
        let last_layout = layouts.last().or(first_layout);
        let fallback_layout = if is_depth_stencil_format(format) {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        };

        let initial_layout = match load_op {
            LoadOp::Load => first_layout.unwrap_or(fallback_layout),
            _ => vk::ImageLayout::UNDEFINED,
        };

        let (stencil_load_op, stencil_store_op) =
            if format_aspects(format).contains(vk::ImageAspectFlags::STENCIL) {
                (load_op, store_op)
            } else {
                (LoadOp::DontCare, StoreOp::DontCare)
            };

        Attachment {
            description: AttachmentDescription {
                format,
                load_op,
                store_op,
                stencil_load_op,
                stencil_store_op,
                initial_layout,
                final_layout: last_layout.unwrap_or(fallback_layout),
                ..Default::default()
            },
            clear_value: None,
            subpass_usages,
        }
    }

    /// Sets the number of samples.
    #[inline]
    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.description.samples = samples;
        self
    }

    /// Sets an explicit clear value.
    #[inline]
    pub fn with_clear_value(mut self, clear_value: impl Into<ClearValue>) -> Self {
        self.clear_value = Some(clear_value.into());
        self
    }

    /// Overrides the derived initial and final layouts.
    #[inline]
    pub fn with_layouts(
        mut self,
        initial_layout: vk::ImageLayout,
        final_layout: vk::ImageLayout,
    ) -> Self {
        self.description.initial_layout = initial_layout;
        self.description.final_layout = final_layout;
        self
    }

    /// Overrides the stencil load and store ops.
    #[inline]
    pub fn with_stencil_ops(mut self, load_op: LoadOp, store_op: StoreOp) -> Self {
        self.description.stencil_load_op = load_op;
        self.description.stencil_store_op = store_op;
        self
    }

    /// Returns the value the attachment is cleared to.
    #[inline]
    pub fn effective_clear_value(&self) -> ClearValue {
        self.clear_value
            .unwrap_or_else(|| ClearValue::default_for_format(self.description.format))
    }
}

#[cfg(test)]
mod tests {
    use super::{Attachment, SubpassUsage};
    use crate::{
        format::ClearValue,
        render_pass::{LoadOp, StoreOp},
    };
    use ash::vk;

    #[test]
    fn derived_layouts() {
        let attachment = Attachment::declare(
            vk::Format::R16G16B16A16_SFLOAT,
            LoadOp::Clear,
            StoreOp::DontCare,
            [SubpassUsage::color(0), SubpassUsage::input(0)],
        );

        assert_eq!(
            attachment.description.initial_layout,
            vk::ImageLayout::UNDEFINED
        );
        assert_eq!(
            attachment.description.final_layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
        assert_eq!(attachment.description.stencil_load_op, LoadOp::DontCare);
    }

    #[test]
    fn loaded_attachment_starts_in_first_layout() {
        let attachment = Attachment::declare(
            vk::Format::D24_UNORM_S8_UINT,
            LoadOp::Load,
            StoreOp::Store,
            [SubpassUsage::Unused, SubpassUsage::DepthStencil],
        );

        assert_eq!(
            attachment.description.initial_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(attachment.description.stencil_load_op, LoadOp::Load);
        assert_eq!(attachment.description.stencil_store_op, StoreOp::Store);
    }

    #[test]
    fn clear_values() {
        let depth = Attachment::declare(
            vk::Format::D32_SFLOAT,
            LoadOp::Clear,
            StoreOp::DontCare,
            [SubpassUsage::DepthStencil],
        );
        assert_eq!(depth.effective_clear_value(), ClearValue::Depth(1.0));

        let color = depth.clone().with_clear_value([0.2, 0.3, 0.4, 1.0]);
        assert_eq!(
            color.effective_clear_value(),
            ClearValue::Float([0.2, 0.3, 0.4, 1.0])
        );
    }

    #[test]
    fn usage_layouts() {
        assert!(!SubpassUsage::Preserve.is_used());
        assert_eq!(SubpassUsage::Unused.layout(), None);
        assert_eq!(
            SubpassUsage::color_resolved(0, 3).layout(),
            Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        );
    }
}
