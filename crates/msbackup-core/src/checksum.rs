//! Output descriptor checksum
//!
//! Bit-exact port of the checksum Bitcoin Core appends to descriptors
//! (`#` followed by 8 characters). Wallet software rejects a descriptor whose
//! checksum does not match, so this must agree with Core for every input.

/// Characters a descriptor may contain, ordered by symbol value
const INPUT_CHARSET: &str = "0123456789()[],'/*abcdefgh@:$%{}\
IJKLMNOPQRSTUVWXYZ&+-.;<=>?!^_|~\
ijklmnopqrstuvwxyzABCDEFGH`#\"\\ ";

/// Checksum output alphabet (bech32)
const CHECKSUM_CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Number of checksum characters
pub const CHECKSUM_LEN: usize = 8;

fn poly_mod(c: u64, val: u64) -> u64 {
    let c0 = c >> 35;
    let mut c = ((c & 0x7_ffff_ffff) << 5) ^ val;
    if c0 & 1 != 0 {
        c ^= 0xf5_dee5_1989;
    }
    if c0 & 2 != 0 {
        c ^= 0xa9_fdca_3312;
    }
    if c0 & 4 != 0 {
        c ^= 0x1b_ab10_e32d;
    }
    if c0 & 8 != 0 {
        c ^= 0x37_06b1_677a;
    }
    if c0 & 16 != 0 {
        c ^= 0x64_4d62_6ffd;
    }
    c
}

/// Compute the 8-character checksum of a descriptor (without its `#` suffix).
///
/// Returns an empty string if `span` contains a character outside the
/// descriptor alphabet.
pub fn descriptor_checksum(span: &str) -> String {
    let mut c: u64 = 1;
    let mut cls: u64 = 0;
    let mut cls_count = 0;

    for ch in span.chars() {
        let Some(pos) = INPUT_CHARSET.find(ch) else {
            return String::new();
        };
        let pos = pos as u64;
        c = poly_mod(c, pos & 31);
        cls = cls * 3 + (pos >> 5);
        cls_count += 1;
        if cls_count == 3 {
            c = poly_mod(c, cls);
            cls = 0;
            cls_count = 0;
        }
    }
    if cls_count > 0 {
        c = poly_mod(c, cls);
    }
    for _ in 0..CHECKSUM_LEN {
        c = poly_mod(c, 0);
    }
    c ^= 1;

    (0..CHECKSUM_LEN)
        .map(|j| CHECKSUM_CHARSET[((c >> (5 * (7 - j))) & 31) as usize] as char)
        .collect()
}

/// Split `desc#checksum` into its parts. The checksum is `None` when absent.
pub fn split_checksum(descriptor: &str) -> (&str, Option<&str>) {
    match descriptor.find('#') {
        Some(i) => (&descriptor[..i], Some(&descriptor[i + 1..])),
        None => (descriptor, None),
    }
}

/// Append a freshly computed checksum, replacing any existing one.
///
/// Returns the bare descriptor if no checksum can be computed for it.
pub fn with_checksum(descriptor: &str) -> String {
    let (body, _) = split_checksum(descriptor);
    let checksum = descriptor_checksum(body);
    if checksum.is_empty() {
        return body.to_string();
    }
    format!("{}#{}", body, checksum)
}

/// True if `descriptor` carries a checksum and it matches its body
pub fn verify_checksum(descriptor: &str) -> bool {
    match split_checksum(descriptor) {
        (body, Some(checksum)) => {
            checksum.len() == CHECKSUM_LEN && descriptor_checksum(body) == checksum
        }
        (_, None) => false,
    }
}
