//! # Internal Macros
//!
//! ## zerocopy_accessors!
//!
//! Generates getter and setter methods for zerocopy struct fields stored as
//! little-endian `U32` wrappers. Every on-disk header in this crate is made of
//! such fields, so the accessors read and write native `u32` values.
//!
//! ### Usage
//!
//! ```ignore
//! use zerocopy::little_endian::U32;
//!
//! #[repr(C)]
//! struct RecordHeader {
//!     capacity: U32,
//!     length: U32,
//! }
//!
//! impl RecordHeader {
//!     zerocopy_accessors! {
//!         capacity: u32,
//!         length: u32,
//!     }
//! }
//!
//! // Generates:
//! // pub fn capacity(&self) -> u32 { self.capacity.get() }
//! // pub fn set_capacity(&mut self, val: u32) { self.capacity = U32::new(val); }
//! // pub fn length(&self) -> u32 { self.length.get() }
//! // pub fn set_length(&mut self, val: u32) { self.length = U32::new(val); }
//! ```

/// Generates getter and setter methods for zerocopy little-endian fields.
#[macro_export]
macro_rules! zerocopy_accessors {
    (@impl $field:ident, u32) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u32 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u32) {
                self.$field = ::zerocopy::little_endian::U32::new(val);
            }
        }
    };
    ($($field:ident : $ty:tt),* $(,)?) => {
        $(
            $crate::zerocopy_accessors!(@impl $field, $ty);
        )*
    };
}
