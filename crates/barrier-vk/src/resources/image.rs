use std::{
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
};

use ash::vk;

use crate::{
    allocator::{Allocator, AnonymAllocation, ManagedAllocation, MemoryUsage},
    context::Device,
    error::{AllocationError, ResourceError},
};

///Describes all static parameters of an image view. The easiest way is to create the view description via
/// [Image::view_all].
#[derive(Clone, Copy, Debug)]
pub struct ImgViewDesc {
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub component_mapping: vk::ComponentMapping,
    pub range: vk::ImageSubresourceRange,
}

impl ImgViewDesc {
    ///Overwrites all fields (that apply) of `builder` with the data in `self`
    pub fn set_on_builder<'a>(
        &self,
        builder: vk::ImageViewCreateInfo<'a>,
    ) -> vk::ImageViewCreateInfo<'a> {
        builder
            .components(self.component_mapping)
            .view_type(self.view_type)
            .format(self.format)
            .subresource_range(self.range)
    }
}

///[ash::vk::ImageView](ash::vk::ImageView) wrapper that keeps its source image alive and destroys itself when not in use anymore.
pub struct ImageView {
    pub desc: ImgViewDesc,
    pub device: Arc<Device>,
    pub view: vk::ImageView,
    pub src_img: Arc<Image>,
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_image_view(self.view, None) };
    }
}

///Image description of a single layer, single mip 2D image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImgDesc {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
}

impl ImgDesc {
    ///Creates a simple storage image description. Transfer usages have to be added if needed.
    pub fn storage_image_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            format,
            extent: vk::Extent2D { width, height },
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::STORAGE,
        }
    }

    ///Appends the additional usage
    pub fn add_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    ///overwrites all infos that apply of `builder` with the data of `self`.
    pub fn set_on_builder<'a>(&self, builder: vk::ImageCreateInfo<'a>) -> vk::ImageCreateInfo<'a> {
        builder
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.format)
            .extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(self.tiling)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
    }
}

///Self managing image that uses the allocator `A` to allocate and free its bound memory.
//Note Freeing happens in `ManagedAllocation`'s implementation.
pub struct Image {
    ///vulkan image handle
    pub inner: vk::Image,
    ///associated allocation that is freed when the image is dropped
    pub allocation: Box<dyn AnonymAllocation + Send + Sync + 'static>,
    pub desc: ImgDesc,
    pub usage: MemoryUsage,
    pub device: Arc<Device>,
}

///The hash implementation is based on [Image](ash::vk::Image)'s hash.
impl Hash for Image {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.inner.hash(hasher)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_image(self.inner, None) }
    }
}

impl Image {
    ///Creates the image based on the description.
    ///
    /// Note that the image is created with an `UNDEFINED` layout. Layout tracking is up to the user of the image.
    pub fn new<A: Allocator + Send + Sync + 'static>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        description: ImgDesc,
        memory_usage: MemoryUsage,
        name: Option<&str>,
    ) -> Result<Self, ResourceError> {
        let builder = description
            .set_on_builder(vk::ImageCreateInfo::default())
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.inner.create_image(&builder, None)? };

        let is_linear = description.tiling == vk::ImageTiling::LINEAR;
        let allocation = match allocator.lock() {
            Ok(mut alloc) => alloc
                .allocate_image(&device.inner, name, &image, memory_usage, is_linear)
                .map_err(|e| AllocationError::Allocator(Box::new(e))),
            Err(_) => Err(AllocationError::Poisoned),
        };
        let allocation = match allocation {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.inner.destroy_image(image, None) };
                return Err(e.into());
            }
        };
        let managed = ManagedAllocation {
            allocator: allocator.clone(),
            allocation: Some(allocation),
        };

        if let Err(e) = unsafe {
            device
                .inner
                .bind_image_memory(image, managed.memory(), managed.offset())
        } {
            unsafe { device.inner.destroy_image(image, None) };
            return Err(e.into());
        }

        Ok(Image {
            allocation: Box::new(managed),
            desc: description,
            inner: image,
            device: device.clone(),
            usage: memory_usage,
        })
    }

    pub fn extent_3d(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.desc.extent.width,
            height: self.desc.extent.height,
            depth: 1,
        }
    }

    pub fn extent_2d(&self) -> vk::Extent2D {
        self.desc.extent
    }

    ///Returns a sub resource range that encloses the whole image.
    pub fn subresource_all(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    ///Subresource layers of the only mip level.
    pub fn subresource_layers_all(&self) -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    ///Copy region covering the whole image, tightly packed in the buffer.
    pub fn buffer_copy_region(&self) -> vk::BufferImageCopy {
        vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: self.subresource_layers_all(),
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: self.extent_3d(),
        }
    }

    ///Creates an [ImgViewDesc](ImgViewDesc) that encloses the whole image.
    pub fn view_all(&self) -> ImgViewDesc {
        ImgViewDesc {
            component_mapping: vk::ComponentMapping::default(),
            format: self.desc.format,
            range: self.subresource_all(),
            view_type: vk::ImageViewType::TYPE_2D,
        }
    }
}

///If implemented, creates a self managing image view that keeps its source image and device alive long enough
/// to destroy the inner view when dropped.
pub trait SafeImageView {
    fn view(&self, desc: ImgViewDesc) -> Result<ImageView, ResourceError>;
}

impl SafeImageView for Arc<Image> {
    ///Creates an image view for this image based on the based `desc`.
    fn view(&self, desc: ImgViewDesc) -> Result<ImageView, ResourceError> {
        let builder = desc.set_on_builder(vk::ImageViewCreateInfo::default().image(self.inner));
        let view = unsafe { self.device.inner.create_image_view(&builder, None)? };

        Ok(ImageView {
            desc,
            device: self.device.clone(),
            view,
            src_img: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Image: Send, Sync);
        assert_impl_all!(ImageView: Send, Sync);
    }

    #[test]
    fn storage_desc() {
        let desc = ImgDesc::storage_image_2d(32, 32, vk::Format::R32_UINT)
            .add_usage(vk::ImageUsageFlags::TRANSFER_SRC);
        assert!(desc.usage.contains(vk::ImageUsageFlags::STORAGE));
        assert!(desc.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(!desc.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));

        let ci = desc.set_on_builder(vk::ImageCreateInfo::default());
        assert_eq!(ci.extent.width, 32);
        assert_eq!(ci.extent.depth, 1);
        assert_eq!(ci.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!(ci.format, vk::Format::R32_UINT);
    }
}
