//! The packet-transformation engine: outbound client->server rewriting
//! and inbound server->client rewriting, driven entirely by message
//! length and the configured type-field ranges.

use rand_core::RngCore;
use std::ops::Range;

use crate::config::Config;
use crate::wire::{read_u32_le, write_u32_le};

const WG_HANDSHAKE_INIT: u32 = 1;
const WG_HANDSHAKE_RESPONSE: u32 = 2;
const WG_COOKIE_REPLY: u32 = 3;
const WG_TRANSPORT_DATA: u32 = 4;

const HANDSHAKE_INIT_LEN: usize = 148;
const HANDSHAKE_RESPONSE_LEN: usize = 92;
const COOKIE_REPLY_LEN: usize = 64;
const TRANSPORT_DATA_MIN_LEN: usize = 32;

/// Rewrites one outbound (client -> server) datagram into `out`. Returns
/// whether the caller must emit a junk-before-handshake burst ahead of this
/// packet (true only for a well-formed handshake-init when `Jc > 0`).
pub fn transform_outbound(cfg: &Config, input: &[u8], rng: &mut impl RngCore, out: &mut Vec<u8>) -> bool {
    let n = input.len();
    if n < 4 {
        passthrough(input, out);
        return false;
    }

    let msg_type = read_u32_le(input);
    match (msg_type, n) {
        (t, len) if t == WG_HANDSHAKE_INIT && len == HANDSHAKE_INIT_LEN => {
            handshake_init(cfg, input, rng, out);
            cfg.jc > 0
        }
        (t, len) if t == WG_HANDSHAKE_RESPONSE && len == HANDSHAKE_RESPONSE_LEN => {
            handshake_response(cfg, input, rng, out);
            false
        }
        (t, len) if t == WG_COOKIE_REPLY && len == COOKIE_REPLY_LEN => {
            cookie_reply(cfg, input, rng, out);
            false
        }
        (t, len) if t == WG_TRANSPORT_DATA && len >= TRANSPORT_DATA_MIN_LEN => {
            transport_data(cfg, input, rng, out);
            false
        }
        _ => {
            passthrough(input, out);
            false
        }
    }
}

fn passthrough(input: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.extend_from_slice(input);
}

fn prepend_padding(rng: &mut impl RngCore, padding: u16, frame: &[u8], out: &mut Vec<u8>) {
    out.clear();
    if padding > 0 {
        out.resize(padding as usize, 0);
        rng.fill_bytes(out);
    }
    out.extend_from_slice(frame);
}

fn handshake_init(cfg: &Config, input: &[u8], rng: &mut impl RngCore, out: &mut Vec<u8>) {
    let mut frame = input.to_vec();
    let picked = cfg.h1.sample(rng);
    write_u32_le(&mut frame[0..4], picked);
    if cfg.server_pub_is_set() {
        awg_crypto::recompute_init_mac1(&mut frame, &cfg.mac1key_server);
    }
    prepend_padding(rng, cfg.s1, &frame, out);
}

fn handshake_response(cfg: &Config, input: &[u8], rng: &mut impl RngCore, out: &mut Vec<u8>) {
    // MAC1 is not recomputed here: the peer signed it with the server's
    // key, which is still correct for the reconstructed frame.
    let mut frame = input.to_vec();
    let picked = cfg.h2.sample(rng);
    write_u32_le(&mut frame[0..4], picked);
    prepend_padding(rng, cfg.s2, &frame, out);
}

fn cookie_reply(cfg: &Config, input: &[u8], rng: &mut impl RngCore, out: &mut Vec<u8>) {
    let mut frame = input.to_vec();
    let picked = cfg.h3.sample(rng);
    write_u32_le(&mut frame[0..4], picked);
    prepend_padding(rng, cfg.s3, &frame, out);
}

fn transport_data(cfg: &Config, input: &[u8], rng: &mut impl RngCore, out: &mut Vec<u8>) {
    if cfg.h4_no_op {
        passthrough(input, out);
        return;
    }
    let mut frame = input.to_vec();
    let picked = cfg.h4.sample(rng);
    write_u32_le(&mut frame[0..4], picked);
    prepend_padding(rng, cfg.s4, &frame, out);
}

/// Classifies and rewrites one inbound (server -> client) datagram in
/// place. Returns the valid byte range to forward to the client, or `None`
/// if the datagram must be silently dropped (decoy traffic or a corrupted
/// frame). Tries the offset-0 transport-data fast path first, then falls
/// back to scanning every byte offset up to `max_scan`, checking
/// transport-data before the handshake message types at each offset.
pub fn transform_inbound(cfg: &Config, buf: &mut [u8]) -> Option<Range<usize>> {
    let n = buf.len();

    // Fast path: transport-data sitting at offset 0, the >99% case.
    if n >= 4 {
        let h = read_u32_le(&buf[0..4]);
        if cfg.h4.contains(h) && n >= TRANSPORT_DATA_MIN_LEN {
            if !cfg.h4_no_op {
                write_u32_le(&mut buf[0..4], WG_TRANSPORT_DATA);
            }
            return Some(0..n);
        }
    }

    let mut off = 0usize;
    while off + 4 <= n {
        let h = read_u32_le(&buf[off..off + 4]);
        let rem = n - off;

        if cfg.h4.contains(h) && rem >= TRANSPORT_DATA_MIN_LEN {
            write_u32_le(&mut buf[off..off + 4], WG_TRANSPORT_DATA);
            return Some(off..n);
        }
        if cfg.h1.contains(h) && rem == HANDSHAKE_INIT_LEN {
            write_u32_le(&mut buf[off..off + 4], WG_HANDSHAKE_INIT);
            return Some(off..n);
        }
        if cfg.h2.contains(h) && rem == HANDSHAKE_RESPONSE_LEN {
            write_u32_le(&mut buf[off..off + 4], WG_HANDSHAKE_RESPONSE);
            if cfg.client_pub_is_set() {
                awg_crypto::recompute_response_mac1(
                    &mut buf[off..off + HANDSHAKE_RESPONSE_LEN],
                    &cfg.mac1key_client,
                );
            }
            return Some(off..n);
        }
        if cfg.h3.contains(h) && rem == COOKIE_REPLY_LEN {
            write_u32_le(&mut buf[off..off + 4], WG_COOKIE_REPLY);
            return Some(off..n);
        }

        off += 1;
        if off > cfg.max_scan {
            break;
        }
    }

    None
}
