use std::collections::VecDeque;

use crate::serial::QueueSerial;
use crate::{Backend, Device};

/// Receives native objects that may still be referenced by in-flight work.
pub trait ResourceReclaimer<A: Backend> {
    fn defer_destroy_framebuffer(&mut self, framebuffer: A::Framebuffer);
}

#[derive(Debug)]
enum Garbage<A: Backend> {
    Framebuffer(A::Framebuffer),
}

/// Objects waiting for the submission that last used them to complete.
#[derive(Debug)]
pub struct GarbageQueue<A: Backend> {
    recording_serial: QueueSerial,
    garbage: VecDeque<(QueueSerial, Garbage<A>)>,
}

impl<A: Backend> Default for GarbageQueue<A> {
    fn default() -> Self {
        Self {
            recording_serial: QueueSerial::INVALID,
            garbage: VecDeque::new(),
        }
    }
}

impl<A: Backend> GarbageQueue<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Garbage pushed from now on is tagged with `serial`. Serials must not go backwards.
    pub fn set_recording_serial(&mut self, serial: QueueSerial) {
        debug_assert!(serial >= self.recording_serial);
        self.recording_serial = serial;
    }

    pub fn recording_serial(&self) -> QueueSerial {
        self.recording_serial
    }

    pub fn len(&self) -> usize {
        self.garbage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.garbage.is_empty()
    }

    /// Destroys everything whose serial is not newer than `completed`.
    /// Returns the number of objects destroyed.
    pub fn cleanup(&mut self, device: &A::Device, completed: QueueSerial) -> usize {
        profiling::scope!("GarbageQueue::cleanup");
        let mut destroyed = 0;
        while let Some((serial, _)) = self.garbage.front() {
            if *serial > completed {
                break;
            }
            if let Some((_, garbage)) = self.garbage.pop_front() {
                Self::destroy(device, garbage);
                destroyed += 1;
            }
        }
        if destroyed > 0 {
            log::trace!("destroyed {destroyed} objects up to serial {completed}");
        }
        destroyed
    }

    /// Destroys everything. The device must be idle.
    pub fn destroy_all(&mut self, device: &A::Device) {
        for (_, garbage) in self.garbage.drain(..) {
            Self::destroy(device, garbage);
        }
    }

    fn destroy(device: &A::Device, garbage: Garbage<A>) {
        match garbage {
            Garbage::Framebuffer(framebuffer) => unsafe { device.destroy_framebuffer(framebuffer) },
        }
    }
}

impl<A: Backend> ResourceReclaimer<A> for GarbageQueue<A> {
    fn defer_destroy_framebuffer(&mut self, framebuffer: A::Framebuffer) {
        self.garbage
            .push_back((self.recording_serial, Garbage::Framebuffer(framebuffer)));
    }
}

impl<A: Backend> Drop for GarbageQueue<A> {
    fn drop(&mut self) {
        if !self.garbage.is_empty() {
            log::warn!(
                "garbage queue dropped with {} pending objects, they are leaked",
                self.garbage.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockApi, MockDevice, MockFramebuffer};

    #[test]
    fn cleanup_waits_for_completed_serial() {
        let device = MockDevice::new();
        let mut queue = GarbageQueue::<MockApi>::new();

        queue.set_recording_serial(QueueSerial::from(1));
        queue.defer_destroy_framebuffer(MockFramebuffer(10));
        queue.set_recording_serial(QueueSerial::from(2));
        queue.defer_destroy_framebuffer(MockFramebuffer(11));

        assert_eq!(queue.cleanup(&device, QueueSerial::from(0)), 0);
        assert_eq!(queue.cleanup(&device, QueueSerial::from(1)), 1);
        assert_eq!(device.destroyed(), vec![MockFramebuffer(10)]);
        assert_eq!(queue.len(), 1);

        queue.destroy_all(&device);
        assert!(queue.is_empty());
        assert_eq!(device.destroyed(), vec![MockFramebuffer(10), MockFramebuffer(11)]);
    }
}
