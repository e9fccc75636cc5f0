//! Junk generator (C6): `Jc` randomly sized, randomly filled decoy
//! datagrams sent ahead of a rewritten handshake-init.

use rand_core::RngCore;

use crate::config::Config;

/// Produces exactly `Jc` buffers sized uniformly in `[Jmin, Jmax]`.
/// Returns an empty vec when `Jc == 0`. Called at most once per outbound
/// handshake-init rewrite.
pub fn generate_junk(cfg: &Config, rng: &mut impl RngCore) -> Vec<Vec<u8>> {
    if cfg.jc == 0 {
        return Vec::new();
    }
    let span = u64::from(cfg.jmax - cfg.jmin) + 1;
    (0..cfg.jc)
        .map(|_| {
            let size = cfg.jmin as u64 + rng.next_u64() % span;
            let mut buf = vec![0u8; size as usize];
            rng.fill_bytes(&mut buf);
            buf
        })
        .collect()
}
