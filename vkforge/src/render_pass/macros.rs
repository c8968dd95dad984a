// Copyright (c) 2024 The vkforge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

/// Builds a `RenderPass` with a single subpass.
///
/// ```
/// # #[macro_use] extern crate vkforge;
/// # fn main() {
/// # let device: std::sync::Arc<dyn vkforge::render_pass::RenderPassDevice> = return;
/// use vkforge::ash::vk;
///
/// let render_pass = single_pass_renderpass!(device.clone(),
///     attachments: {
///         // `foo` is a custom name we give to the first and only attachment.
///         foo: {
///             load: Clear,
///             store: Store,
///             format: vk::Format::R8G8B8A8_UNORM,
///             samples: 1,
///         }
///     },
///     pass: {
///         color: [foo],       // Repeat the attachment name here.
///         depth_stencil: {}
///     }
/// ).unwrap();
/// # }
/// ```
#[macro_export]
macro_rules! single_pass_renderpass {
    (
        $device:expr,
        attachments: { $($a:tt)* },
        pass: {
            color: [$($color_atch:ident),*],
            depth_stencil: {$($depth_atch:ident)*}$(,)*
            $(resolve: [$($resolve_atch:ident),*])*$(,)*
        }
    ) => (
        $crate::ordered_passes_renderpass!(
            $device,
            attachments: { $($a)* },
            passes: [
                {
                    color: [$($color_atch),*],
                    depth_stencil: {$($depth_atch)*},
                    input: [],
                    resolve: [$($($resolve_atch),*)*]
                }
            ]
        )
    )
}

/// Builds a `RenderPass` with one or more subpasses, executed in order.
///
/// Color and input attachments get their location from their position in the list. Resolve
/// attachments pair with the color attachments by position. Every attachment that a subpass
/// doesn't use is preserved across it, except for resolve targets. The default subpass
/// dependencies are used.
///
/// Listing an attachment twice in a subpass, or in two roles of the same subpass, is an error.
#[macro_export]
macro_rules! ordered_passes_renderpass {
    (
        $device:expr,
        attachments: {
            $(
                $atch_name:ident: {
                    load: $load:ident,
                    store: $store:ident,
                    format: $format:expr,
                    samples: $samples:expr,
                    $(initial_layout: $init_layout:expr,)*
                    $(final_layout: $final_layout:expr,)*
                    $(clear_value: $clear_value:expr,)*
                }
            ),*
        },
        passes: [
            $(
                {
                    color: [$($color_atch:ident),*],
                    depth_stencil: {$($depth_atch:ident)*},
                    input: [$($input_atch:ident),*]$(,)*
                    $(resolve: [$($resolve_atch:ident),*])*$(,)*
                }
            ),*
        ]
    ) => ({
        use $crate::render_pass::{
            Attachment, LoadOp, RenderPass, RenderPassCreationError, RenderPassDescription,
            StoreOp, SubpassUsage,
        };

        let create = || -> Result<::std::sync::Arc<RenderPass>, RenderPassCreationError> {
            #[allow(unused)]
            let mut attachment_num = 0u32;
            $(
                #[allow(unused_variables)]
                let $atch_name = attachment_num;
                attachment_num += 1;
            )*

            #[allow(unused_mut)]
            let mut usages: Vec<Vec<SubpassUsage>> = vec![Vec::new(); attachment_num as usize];
            #[allow(unused_mut)]
            let mut subpass_count = 0u32;

            $({
                let subpass = subpass_count;
                let mut pass_usages: Vec<Option<SubpassUsage>> = vec![None; attachment_num as usize];
                let resolves: Vec<u32> = vec![$($($resolve_atch),*)*];
                let colors: Vec<u32> = vec![$($color_atch),*];

                if !resolves.is_empty() && resolves.len() != colors.len() {
                    return Err(
                        RenderPassCreationError::SubpassResolveAttachmentsColorAttachmentsLenMismatch {
                            subpass,
                            resolve_attachments: resolves.len() as u32,
                            color_attachments: colors.len() as u32,
                        },
                    );
                }

                // An attachment can appear at most once per subpass, in a single role.
                let mut assign = |attachment: u32,
                                  usage: SubpassUsage|
                 -> Result<(), RenderPassCreationError> {
                    match pass_usages[attachment as usize] {
                        None => {
                            pass_usages[attachment as usize] = Some(usage);
                            Ok(())
                        }
                        Some(previous)
                            if ::std::mem::discriminant(&previous)
                                == ::std::mem::discriminant(&usage) =>
                        {
                            Err(RenderPassCreationError::SubpassAttachmentRepeated {
                                subpass,
                                attachment,
                            })
                        }
                        Some(_) => Err(RenderPassCreationError::SubpassAttachmentMultipleRoles {
                            subpass,
                            attachment,
                        }),
                    }
                };

                // Resolve targets are written by the resolve, so they aren't preserved.
                for &resolve in &resolves {
                    assign(resolve, SubpassUsage::Unused)?;
                }
                for (location, &color) in (0u32..).zip(&colors) {
                    assign(
                        color,
                        SubpassUsage::Color {
                            location,
                            resolve_to: resolves.get(location as usize).copied(),
                        },
                    )?;
                }
                $(
                    assign($depth_atch, SubpassUsage::DepthStencil)?;
                )*
                #[allow(unused)]
                let mut location = 0u32;
                $(
                    assign($input_atch, SubpassUsage::Input { location })?;
                    location += 1;
                )*

                for (attachment, usage) in usages.iter_mut().zip(pass_usages) {
                    attachment.push(usage.unwrap_or(SubpassUsage::Preserve));
                }
                subpass_count += 1;
            })*

            #[allow(unused)]
            let mut usages = usages.into_iter();
            let attachments: Vec<Attachment> = vec![
                $({
                    #[allow(unused_mut)]
                    let mut attachment = Attachment::declare(
                        $format,
                        LoadOp::$load,
                        StoreOp::$store,
                        usages.next().unwrap_or_default(),
                    )
                    .with_samples($crate::ash::vk::SampleCountFlags::from_raw($samples));
                    $(attachment.description.initial_layout = $init_layout;)*
                    $(attachment.description.final_layout = $final_layout;)*
                    $(attachment.clear_value = Some($clear_value.into());)*
                    attachment
                }),*
            ];

            RenderPassDescription::with_subpass_count(attachments, subpass_count)?.build($device)
        };

        create()
    });
}
