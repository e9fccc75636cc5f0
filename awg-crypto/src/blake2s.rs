//! RFC 7693 BLAKE2s, restricted to what MAC1 needs: an unkeyed 256-bit
//! digest and a keyed 128-bit MAC. No tree mode, no salt, no personalization.

const IV: [u32; 8] = [
    0x6A09_E667,
    0xBB67_AE85,
    0x3C6E_F372,
    0xA54F_F53A,
    0x510E_527F,
    0x9B05_688C,
    0x1F83_D9AB,
    0x5BE0_CD19,
];

const SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

const BLOCK: usize = 64;
const MAX_OUT: usize = 32;
const MAX_KEY: usize = 32;

#[inline(always)]
fn g(v: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize, x: u32, y: u32) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(12);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(8);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(7);
}

fn compress(h: &mut [u32; 8], block: &[u8; BLOCK], t: u64, last: bool) {
    let mut m = [0u32; 16];
    for (word, chunk) in m.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_le_bytes(chunk.try_into().unwrap());
    }

    let mut v = [0u32; 16];
    v[..8].copy_from_slice(h);
    v[8..16].copy_from_slice(&IV);
    v[12] ^= t as u32;
    v[13] ^= (t >> 32) as u32;
    if last {
        v[14] ^= 0xFFFF_FFFF;
    }

    for round in &SIGMA {
        g(&mut v, 0, 4, 8, 12, m[round[0]], m[round[1]]);
        g(&mut v, 1, 5, 9, 13, m[round[2]], m[round[3]]);
        g(&mut v, 2, 6, 10, 14, m[round[4]], m[round[5]]);
        g(&mut v, 3, 7, 11, 15, m[round[6]], m[round[7]]);
        g(&mut v, 0, 5, 10, 15, m[round[8]], m[round[9]]);
        g(&mut v, 1, 6, 11, 12, m[round[10]], m[round[11]]);
        g(&mut v, 2, 7, 8, 13, m[round[12]], m[round[13]]);
        g(&mut v, 3, 4, 9, 14, m[round[14]], m[round[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

/// Incremental BLAKE2s state. Buffers a trailing block so the last
/// `compress` call can be flagged correctly without look-ahead on `update`.
pub struct Blake2s {
    h: [u32; 8],
    t: u64,
    buf: [u8; BLOCK],
    buflen: usize,
    outlen: usize,
}

impl Blake2s {
    fn new_raw(outlen: usize, key: Option<&[u8]>) -> Self {
        assert!(outlen >= 1 && outlen <= MAX_OUT, "blake2s output length out of range");
        let keylen = key.map_or(0, |k| k.len());
        assert!(keylen <= MAX_KEY, "blake2s key too long");

        let mut h = IV;
        h[0] ^= outlen as u32 | ((keylen as u32) << 8) | 0x0101_0000;

        let mut this = Self {
            h,
            t: 0,
            buf: [0; BLOCK],
            buflen: 0,
            outlen,
        };

        if let Some(key) = key {
            let mut block = [0u8; BLOCK];
            block[..key.len()].copy_from_slice(key);
            this.update(&block);
        }

        this
    }

    /// Unkeyed digest, `outlen` in `1..=32` bytes. MAC1 only ever needs 32.
    pub fn new(outlen: usize) -> Self {
        Self::new_raw(outlen, None)
    }

    /// Keyed MAC, `outlen` in `1..=32` bytes. MAC1 needs 16.
    pub fn new_keyed(key: &[u8], outlen: usize) -> Self {
        Self::new_raw(outlen, Some(key))
    }

    pub fn update(&mut self, mut data: &[u8]) {
        if data.is_empty() {
            return;
        }

        if self.buflen > 0 {
            let room = BLOCK - self.buflen;
            if data.len() > room {
                self.buf[self.buflen..].copy_from_slice(&data[..room]);
                self.t += BLOCK as u64;
                let block = self.buf;
                compress(&mut self.h, &block, self.t, false);
                self.buflen = 0;
                data = &data[room..];
            } else {
                self.buf[self.buflen..self.buflen + data.len()].copy_from_slice(data);
                self.buflen += data.len();
                return;
            }
        }

        while data.len() > BLOCK {
            self.t += BLOCK as u64;
            let block: [u8; BLOCK] = data[..BLOCK].try_into().unwrap();
            compress(&mut self.h, &block, self.t, false);
            data = &data[BLOCK..];
        }

        self.buf[..data.len()].copy_from_slice(data);
        self.buflen = data.len();
    }

    pub fn finalize(mut self) -> [u8; MAX_OUT] {
        for b in &mut self.buf[self.buflen..] {
            *b = 0;
        }
        self.t += self.buflen as u64;
        let block = self.buf;
        compress(&mut self.h, &block, self.t, true);

        let mut out = [0u8; MAX_OUT];
        for i in 0..8 {
            out[i * 4..i * 4 + 4].copy_from_slice(&self.h[i].to_le_bytes());
        }
        out
    }

    pub fn outlen(&self) -> usize {
        self.outlen
    }
}

/// One-shot unkeyed BLAKE2s-256 over the concatenation of `parts`.
pub fn digest256(parts: &[&[u8]]) -> [u8; 32] {
    let mut state = Blake2s::new(32);
    for part in parts {
        state.update(part);
    }
    state.finalize()
}

/// One-shot keyed BLAKE2s-128 MAC over the concatenation of `parts`.
pub fn mac128(key: &[u8], parts: &[&[u8]]) -> [u8; 16] {
    let mut state = Blake2s::new_keyed(key, 16);
    for part in parts {
        state.update(part);
    }
    let full = state.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&full[..16]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use blake2::digest::consts::U16;

    fn reference_digest256(data: &[u8]) -> [u8; 32] {
        use blake2::Digest;
        blake2::Blake2s256::default().chain_update(data).finalize().into()
    }

    fn reference_mac128(key: &[u8], data: &[u8]) -> [u8; 16] {
        use blake2::digest::Mac;
        let mut mac = blake2::Blake2sMac::<U16>::new_from_slice(key).unwrap();
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    fn pattern(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn digest_matches_reference_across_block_boundaries() {
        for len in [0usize, 1, 63, 64, 65, 128, 200] {
            let data = pattern(len);
            assert_eq!(
                digest256(&[&data]),
                reference_digest256(&data),
                "length {len}"
            );
        }
    }

    #[test]
    fn digest_split_updates_equal_single_update() {
        let data = pattern(200);
        let whole = digest256(&[&data]);

        let mut state = Blake2s::new(32);
        state.update(&data[..1]);
        state.update(&data[1..63]);
        state.update(&data[63..64]);
        state.update(&data[64..]);
        let split = state.finalize();

        assert_eq!(whole, split);
    }

    #[test]
    fn mac_matches_reference() {
        let key = pattern(32);
        for len in [0usize, 1, 63, 64, 65, 128, 200] {
            let data = pattern(len);
            assert_eq!(
                mac128(&key, &[&data]),
                reference_mac128(&key, &data),
                "length {len}"
            );
        }
    }

    #[test]
    fn mac_equals_first_16_bytes_of_keyed_256_output() {
        let key = pattern(32);
        let data = pattern(77);
        let mut keyed256 = Blake2s::new_keyed(&key, 32);
        keyed256.update(&data);
        let full = keyed256.finalize();
        assert_eq!(&full[..16], &mac128(&key, &[&data])[..]);
    }

    #[test]
    fn empty_input_is_well_defined() {
        let d = digest256(&[&[]]);
        assert_eq!(d, reference_digest256(&[]));
        let m = mac128(&[0u8; 32], &[&[]]);
        assert_eq!(m, reference_mac128(&[0u8; 32], &[]));
    }
}
