use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! define_serial {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Default,
            derive_more::Display,
            derive_more::From,
            derive_more::Into,
        )]
        pub struct $name(u64);

        impl $name {
            pub const INVALID: Self = Self(0);

            pub fn is_valid(self) -> bool {
                self != Self::INVALID
            }

            pub fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

define_serial!(
    /// Identity of an image. Changes when the underlying storage is reallocated.
    ResourceSerial
);
define_serial!(
    /// Identity of a particular view (format, level, layer range) of an image.
    ViewSerial
);
define_serial!(
    /// Monotonic id of a command submission.
    QueueSerial
);

/// Hands out unique, never-reused serials. Zero is reserved for `INVALID`.
#[derive(Debug)]
pub struct SerialFactory {
    next: AtomicU64,
}

impl Default for SerialFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialFactory {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn generate<T: From<u64>>(&self) -> T {
        T::from(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_never_hands_out_invalid() {
        let factory = SerialFactory::new();
        let a: ViewSerial = factory.generate();
        let b: ViewSerial = factory.generate();
        assert!(a.is_valid());
        assert_ne!(a, b);
        assert!(a < b);
        assert!(!ViewSerial::default().is_valid());
    }

    #[test]
    fn queue_serials_order_by_value() {
        assert!(QueueSerial::from(3) < QueueSerial::from(7));
        assert_eq!(u64::from(QueueSerial::from(7)), 7);
        assert_eq!(QueueSerial::from(7).to_string(), "7");
    }
}
