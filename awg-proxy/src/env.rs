//! Reads every `AWG_*` environment variable into an `awg_core::RawParams`.
//! Every missing or malformed variable is collected; nothing here fails
//! fast, matching the aggregated configuration-error report at the wire
//! level.

use base64ct::{Base64, Encoding};

use awg_core::{LogLevel, RangeU32, RawParams};

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("{0} is required but not set")]
    Missing(&'static str),
    #[error("{var}={value:?} is not valid: {reason}")]
    Invalid { var: &'static str, value: String, reason: String },
}

pub fn load() -> Result<RawParams, Vec<EnvError>> {
    let mut errors = Vec::new();

    let listen = require("AWG_LISTEN", &mut errors);
    let remote = require("AWG_REMOTE", &mut errors);

    let jc = require_u32("AWG_JC", &mut errors);
    let jmin = require_u16("AWG_JMIN", &mut errors);
    let jmax = require_u16("AWG_JMAX", &mut errors);
    let s1 = require_u16("AWG_S1", &mut errors);
    let s2 = require_u16("AWG_S2", &mut errors);
    let s3 = optional_u16("AWG_S3", 0, &mut errors);
    let s4 = optional_u16("AWG_S4", 0, &mut errors);

    let h1 = require_range("AWG_H1", &mut errors);
    let h2 = require_range("AWG_H2", &mut errors);
    let h3 = require_range("AWG_H3", &mut errors);
    let h4 = require_range("AWG_H4", &mut errors);

    let cps_raw = [
        std::env::var("AWG_I1").ok(),
        std::env::var("AWG_I2").ok(),
        std::env::var("AWG_I3").ok(),
        std::env::var("AWG_I4").ok(),
        std::env::var("AWG_I5").ok(),
    ];

    let server_pub = optional_pubkey("AWG_SERVER_PUB", &mut errors);
    let client_pub = optional_pubkey("AWG_CLIENT_PUB", &mut errors);

    let timeout_secs = optional_u64("AWG_TIMEOUT", 180, &mut errors);
    let log_level = optional_log_level("AWG_LOG_LEVEL", &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    // require() above already forced listen/remote present, so dropping
    // them here can't lose an unreported error; they ride alongside
    // RawParams via listen_addr()/remote_addr() since they're socket-layer
    // strings, not obfuscation parameters.
    let _ = (listen, remote);

    Ok(RawParams {
        jc: jc.unwrap(),
        jmin: jmin.unwrap(),
        jmax: jmax.unwrap(),
        s1: s1.unwrap(),
        s2: s2.unwrap(),
        s3: s3.unwrap(),
        s4: s4.unwrap(),
        h1: h1.unwrap(),
        h2: h2.unwrap(),
        h3: h3.unwrap(),
        h4: h4.unwrap(),
        cps_raw,
        server_pub: server_pub.unwrap(),
        client_pub: client_pub.unwrap(),
        timeout_secs: timeout_secs.unwrap(),
        log_level: log_level.unwrap(),
    })
}

/// Re-reads `AWG_LISTEN`/`AWG_REMOTE`; safe to unwrap once `load` has
/// already returned `Ok`.
pub fn listen_addr() -> Result<String, EnvError> {
    std::env::var("AWG_LISTEN").map_err(|_| EnvError::Missing("AWG_LISTEN"))
}

pub fn remote_addr() -> Result<String, EnvError> {
    std::env::var("AWG_REMOTE").map_err(|_| EnvError::Missing("AWG_REMOTE"))
}

fn require(var: &'static str, errors: &mut Vec<EnvError>) -> Option<String> {
    match std::env::var(var) {
        Ok(v) => Some(v),
        Err(_) => {
            errors.push(EnvError::Missing(var));
            None
        }
    }
}

fn require_u32(var: &'static str, errors: &mut Vec<EnvError>) -> Option<u32> {
    require(var, errors).and_then(|v| parse_u32(var, &v, errors))
}

fn require_u16(var: &'static str, errors: &mut Vec<EnvError>) -> Option<u16> {
    require(var, errors).and_then(|v| parse_u16(var, &v, errors))
}

fn optional_u16(var: &'static str, default: u16, errors: &mut Vec<EnvError>) -> Option<u16> {
    match std::env::var(var) {
        Ok(v) => parse_u16(var, &v, errors),
        Err(_) => Some(default),
    }
}

fn optional_u64(var: &'static str, default: u64, errors: &mut Vec<EnvError>) -> Option<u64> {
    match std::env::var(var) {
        Ok(v) => v
            .parse::<u64>()
            .map_err(|e| {
                errors.push(EnvError::Invalid { var, value: v.clone(), reason: e.to_string() });
            })
            .ok(),
        Err(_) => Some(default),
    }
}

fn parse_u32(var: &'static str, raw: &str, errors: &mut Vec<EnvError>) -> Option<u32> {
    match raw.parse::<u32>() {
        Ok(n) => Some(n),
        Err(e) => {
            errors.push(EnvError::Invalid { var, value: raw.to_string(), reason: e.to_string() });
            None
        }
    }
}

fn parse_u16(var: &'static str, raw: &str, errors: &mut Vec<EnvError>) -> Option<u16> {
    match raw.parse::<u16>() {
        Ok(n) => Some(n),
        Err(e) => {
            errors.push(EnvError::Invalid { var, value: raw.to_string(), reason: e.to_string() });
            None
        }
    }
}

/// Parses either a bare decimal `u32` or a `min-max` decimal range.
fn require_range(var: &'static str, errors: &mut Vec<EnvError>) -> Option<RangeU32> {
    let raw = require(var, errors)?;
    match raw.split_once('-') {
        None => {
            let v = parse_u32(var, &raw, errors)?;
            Some(RangeU32::single(v))
        }
        Some((lo, hi)) => {
            let lo = lo.trim().parse::<u32>();
            let hi = hi.trim().parse::<u32>();
            match (lo, hi) {
                (Ok(lo), Ok(hi)) => RangeU32::new(lo, hi).or_else(|| {
                    errors.push(EnvError::Invalid {
                        var,
                        value: raw.clone(),
                        reason: format!("min ({lo}) must be <= max ({hi})"),
                    });
                    None
                }),
                _ => {
                    errors.push(EnvError::Invalid {
                        var,
                        value: raw.clone(),
                        reason: "expected a decimal value or a min-max decimal range".to_string(),
                    });
                    None
                }
            }
        }
    }
}

fn optional_pubkey(var: &'static str, errors: &mut Vec<EnvError>) -> Option<[u8; 32]> {
    match std::env::var(var) {
        Err(_) => Some([0u8; 32]),
        Ok(v) => {
            let mut buf = [0u8; 32];
            match Base64::decode(v.trim(), &mut buf) {
                Ok(decoded) if decoded.len() == 32 => Some(buf),
                Ok(decoded) => {
                    errors.push(EnvError::Invalid {
                        var,
                        value: v,
                        reason: format!("decoded to {} bytes, expected 32", decoded.len()),
                    });
                    None
                }
                Err(e) => {
                    errors.push(EnvError::Invalid { var, value: v, reason: e.to_string() });
                    None
                }
            }
        }
    }
}

fn optional_log_level(var: &'static str, errors: &mut Vec<EnvError>) -> Option<LogLevel> {
    match std::env::var(var) {
        Err(_) => Some(LogLevel::default()),
        Ok(v) => match LogLevel::parse(&v) {
            Some(level) => Some(level),
            None => {
                errors.push(EnvError::Invalid {
                    var,
                    value: v,
                    reason: "expected one of none, error, info, debug".to_string(),
                });
                None
            }
        },
    }
}
