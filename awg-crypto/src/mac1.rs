use crate::blake2s::{digest256, mac128};

const LABEL_MAC1: &[u8; 8] = b"mac1----";

/// `mac1key = BLAKE2s-256("mac1----" || peer_pub)`, derived once at config
/// finalization for each of the server and client public keys.
pub fn mac1_key(peer_pub: &[u8; 32]) -> [u8; 32] {
    digest256(&[LABEL_MAC1, peer_pub])
}

/// Rewrites the MAC1 field of a 148-byte handshake-init buffer in place:
/// `buf[116..132] = mac128(mac1key, buf[0..116])`.
///
/// Panics if `buf` is not exactly 148 bytes; the transform engine only ever
/// calls this on a buffer it has already validated as a handshake-init.
pub fn recompute_init_mac1(buf: &mut [u8], mac1key: &[u8; 32]) {
    assert_eq!(buf.len(), 148, "handshake-init MAC1 recompute needs a 148-byte buffer");
    let tag = mac128(mac1key, &[&buf[0..116]]);
    buf[116..132].copy_from_slice(&tag);
}

/// Rewrites the MAC1 field of a 92-byte handshake-response buffer in place:
/// `buf[60..76] = mac128(mac1key, buf[0..60])`.
pub fn recompute_response_mac1(buf: &mut [u8], mac1key: &[u8; 32]) {
    assert_eq!(buf.len(), 92, "handshake-response MAC1 recompute needs a 92-byte buffer");
    let tag = mac128(mac1key, &[&buf[0..60]]);
    buf[60..76].copy_from_slice(&tag);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blake2s::mac128;

    #[test]
    fn init_mac1_matches_direct_mac_call() {
        let key = mac1_key(&[7u8; 32]);
        let mut buf = vec![0u8; 148];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = i as u8;
        }
        recompute_init_mac1(&mut buf, &key);
        let expected = mac128(&key, &[&buf[0..116]]);
        assert_eq!(&buf[116..132], &expected[..]);
    }

    #[test]
    fn response_mac1_matches_direct_mac_call() {
        let key = mac1_key(&[9u8; 32]);
        let mut buf = vec![0u8; 92];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = (i * 3) as u8;
        }
        recompute_response_mac1(&mut buf, &key);
        let expected = mac128(&key, &[&buf[0..60]]);
        assert_eq!(&buf[60..76], &expected[..]);
    }

    #[test]
    #[should_panic]
    fn init_mac1_rejects_wrong_length() {
        let key = mac1_key(&[1u8; 32]);
        let mut buf = vec![0u8; 100];
        recompute_init_mac1(&mut buf, &key);
    }
}
