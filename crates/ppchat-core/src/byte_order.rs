//! Host/network byte-order conversion for buffers of arbitrary width.
//!
//! Network byte order is big-endian.  On a little-endian host converting a
//! value means reversing its bytes; on a big-endian host it is a plain copy.
//! The generic routines work on raw byte buffers of any length and make no
//! attempt to interpret multi-field layouts: a 12-byte buffer is reversed as
//! one 12-byte integer, not as three 4-byte ones.
//!
//! # Sizing
//!
//! Both directions copy `min(input.len(), out.len())` bytes.  Output byte
//! `i` comes from input byte `len - 1 - i`, so when `out` is shorter than the
//! input the leading input bytes are the ones that never make it.  Callers
//! must size buffers correctly; the functions never fail.
//!
//! # Examples
//!
//! ```rust
//! use ppchat_core::byte_order::{host_to_network, network_to_host, NetworkOrder};
//!
//! let value: u32 = 0x1122_3344;
//! let mut wire = [0u8; 4];
//! host_to_network(&value.to_ne_bytes(), &mut wire);
//! assert_eq!(wire, [0x11, 0x22, 0x33, 0x44]);
//! assert_eq!(value.to_network(), wire);
//!
//! let mut back = [0u8; 4];
//! network_to_host(&wire, &mut back);
//! assert_eq!(u32::from_ne_bytes(back), value);
//! ```

/// Converts `bytes` from host to network order into `out`.
///
/// Returns the written prefix of `out` (`min(bytes.len(), out.len())` bytes);
/// the rest of `out` is left untouched.
pub fn host_to_network<'a>(bytes: &[u8], out: &'a mut [u8]) -> &'a mut [u8] {
    swap_into(bytes, out)
}

/// Converts `bytes` from network to host order into `out`.
///
/// The exact mirror of [`host_to_network`].
pub fn network_to_host<'a>(bytes: &[u8], out: &'a mut [u8]) -> &'a mut [u8] {
    swap_into(bytes, out)
}

#[cfg(target_endian = "little")]
fn swap_into<'a>(bytes: &[u8], out: &'a mut [u8]) -> &'a mut [u8] {
    let n = bytes.len().min(out.len());
    for (dst, src) in out.iter_mut().zip(bytes.iter().rev()) {
        *dst = *src;
    }
    &mut out[..n]
}

#[cfg(target_endian = "big")]
fn swap_into<'a>(bytes: &[u8], out: &'a mut [u8]) -> &'a mut [u8] {
    let n = bytes.len().min(out.len());
    let skip = bytes.len() - n;
    out[..n].copy_from_slice(&bytes[skip..]);
    &mut out[..n]
}

/// Fixed-width conversions for the primitive numeric types.
///
/// Every implementation goes through the generic routine, so results are
/// byte-identical to [`host_to_network`] on the value's native bytes (and to
/// `to_be_bytes` / `from_be_bytes`).
pub trait NetworkOrder: Sized {
    /// Byte array of the same width as `Self`.
    type Bytes;

    /// Returns the value's bytes in network order.
    fn to_network(self) -> Self::Bytes;

    /// Rebuilds a value from network-order bytes.
    fn from_network(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_network_order {
    ($($ty:ty => $width:expr),* $(,)?) => {
        $(
            impl NetworkOrder for $ty {
                type Bytes = [u8; $width];

                fn to_network(self) -> [u8; $width] {
                    let mut out = [0u8; $width];
                    host_to_network(&self.to_ne_bytes(), &mut out);
                    out
                }

                fn from_network(bytes: [u8; $width]) -> Self {
                    let mut host = [0u8; $width];
                    network_to_host(&bytes, &mut host);
                    <$ty>::from_ne_bytes(host)
                }
            }
        )*
    };
}

impl_network_order! {
    u16 => 2,
    u32 => 4,
    u64 => 8,
    i16 => 2,
    i32 => 4,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}
