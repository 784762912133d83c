use thiserror::Error;

// refer to https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/VkResult.html

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DeviceError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("The logical or physical device has been lost")]
    Lost,
    #[error("other reason: {0}")]
    Other(&'static str),
    #[error("vulkan error: {0}")]
    #[cfg(feature = "vulkan")]
    VulkanError(ash::vk::Result),
}

#[cfg(feature = "vulkan")]
impl From<ash::vk::Result> for DeviceError {
    fn from(result: ash::vk::Result) -> Self {
        use ash::vk::Result as R;
        match result {
            R::ERROR_OUT_OF_HOST_MEMORY | R::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfMemory,
            R::ERROR_DEVICE_LOST => Self::Lost,
            other => Self::VulkanError(other),
        }
    }
}

/// Why an attachment combination cannot be turned into a framebuffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum IncompleteReason {
    #[error("no attachment is bound")]
    MissingAttachment,
    #[error("attachments have different dimensions")]
    MismatchedDimensions,
    #[error("attachments have different layer counts")]
    MismatchedLayers,
    #[error("attachments have different sample counts")]
    MismatchedSamples,
    #[error("an attachment has a zero-sized extent")]
    ZeroSizedAttachment,
    #[error("resolve target bound to a single-sampled attachment")]
    InvalidResolve,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum FramebufferError {
    #[error("framebuffer is incomplete: {0}")]
    Incomplete(IncompleteReason),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_error_converts_into_framebuffer_error() {
        let err: FramebufferError = DeviceError::OutOfMemory.into();
        assert_eq!(err, FramebufferError::Device(DeviceError::OutOfMemory));
        assert_eq!(err.to_string(), "out of memory");
    }

    #[test]
    fn incomplete_display_names_reason() {
        let err = FramebufferError::Incomplete(IncompleteReason::MismatchedLayers);
        assert_eq!(
            err.to_string(),
            "framebuffer is incomplete: attachments have different layer counts"
        );
    }

    #[cfg(feature = "vulkan")]
    #[test]
    fn vk_result_mapping() {
        use ash::vk;
        assert_eq!(
            DeviceError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            DeviceError::OutOfMemory
        );
        assert_eq!(
            DeviceError::from(vk::Result::ERROR_DEVICE_LOST),
            DeviceError::Lost
        );
        assert_eq!(
            DeviceError::from(vk::Result::ERROR_TOO_MANY_OBJECTS),
            DeviceError::VulkanError(vk::Result::ERROR_TOO_MANY_OBJECTS)
        );
    }
}
