pub use crate::core::util::bytes_compare;

/// The smallest byte vector that sorts strictly after every key with the
/// given prefix. Used to build exclusive upper bounds for range scans.
pub fn increment_vec_u8(vec: &Vec<u8>) -> Vec<u8> {
    let mut result = vec.clone();
    let mut i = result.len();
    while i > 0 {
        i -= 1;
        if result[i] < 255 {
            result[i] += 1;
            for item in result.iter_mut().skip(i + 1) {
                *item = 0;
            }
            return result;
        }
    }
    // All bytes were 0xff; extend instead
    result.push(0);
    result
}

/// Right-pad (or truncate) to a fixed width so variable-length body keys
/// produce fixed-width index keys.
pub fn pad_fixed_width(bytes: &[u8], width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let len = bytes.len().min(width);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}
