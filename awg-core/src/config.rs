//! Obfuscation configuration and its derived fast-path fields.
//! Constructed once at startup and never mutated afterwards; safe to
//! share read-only across every session thread.

use rand_core::RngCore;

use crate::cps::{CpsError, CpsTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeU32 {
    pub min: u32,
    pub max: u32,
}

impl RangeU32 {
    pub fn new(min: u32, max: u32) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    pub fn single(value: u32) -> Self {
        Self { min: value, max: value }
    }

    #[inline]
    pub fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }

    #[inline]
    pub fn is_collapsed(&self) -> bool {
        self.min == self.max
    }

    /// Uniformly samples a value in `[min, max]`. Takes the collapsed-range
    /// fast path (no RNG call) when `min == max`.
    pub fn sample(&self, rng: &mut impl RngCore) -> u32 {
        if self.is_collapsed() {
            return self.min;
        }
        let span = u64::from(self.max - self.min) + 1;
        self.min + (rng.next_u64() % span) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    None,
    Error,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "error" => Some(Self::Error),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }
}

/// Every field an operator can set, already parsed from text into the
/// right primitive type but not yet range-checked against each other.
/// Building the (textual) parse step is the job of the `awg-proxy` binary;
/// this struct is the seam between that thin wrapper and the core.
pub struct RawParams {
    pub jc: u32,
    pub jmin: u16,
    pub jmax: u16,
    pub s1: u16,
    pub s2: u16,
    pub s3: u16,
    pub s4: u16,
    pub h1: RangeU32,
    pub h2: RangeU32,
    pub h3: RangeU32,
    pub h4: RangeU32,
    pub cps_raw: [Option<String>; 5],
    pub server_pub: [u8; 32],
    pub client_pub: [u8; 32],
    pub timeout_secs: u64,
    pub log_level: LogLevel,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    OutOfRange { var: &'static str, reason: String },
    #[error("Jmin ({jmin}) must be <= Jmax ({jmax})")]
    JunkRangeInverted { jmin: u16, jmax: u16 },
    #[error("{var}: {source}")]
    Cps { var: &'static str, source: CpsError },
}

pub struct Config {
    pub jc: u32,
    pub jmin: u16,
    pub jmax: u16,
    pub s1: u16,
    pub s2: u16,
    pub s3: u16,
    pub s4: u16,
    pub h1: RangeU32,
    pub h2: RangeU32,
    pub h3: RangeU32,
    pub h4: RangeU32,
    pub cps: [Option<CpsTemplate>; 5],
    pub server_pub: [u8; 32],
    pub client_pub: [u8; 32],
    pub timeout_secs: u64,
    pub log_level: LogLevel,

    // Derived once here so the hot path never recomputes them.
    pub mac1key_server: [u8; 32],
    pub mac1key_client: [u8; 32],
    pub max_scan: usize,
    pub h4_no_op: bool,
}

const CPS_VARS: [&str; 5] = ["AWG_I1", "AWG_I2", "AWG_I3", "AWG_I4", "AWG_I5"];
const MAX_PADDING: u32 = 256;
const MAX_JUNK_SIZE: u32 = 1500;

impl Config {
    /// Validates `raw` and builds the derived fast-path fields. Every
    /// violation is collected; the caller gets either a fully valid
    /// `Config` or the complete list of problems, never a "first error
    /// wins" partial report.
    pub fn build(raw: RawParams) -> Result<Config, Vec<ConfigError>> {
        let mut errors = Vec::new();

        if raw.jmin > raw.jmax {
            errors.push(ConfigError::JunkRangeInverted { jmin: raw.jmin, jmax: raw.jmax });
        }
        check_range("AWG_JMIN", raw.jmin as u32, 1, MAX_JUNK_SIZE, &mut errors);
        check_range("AWG_JMAX", raw.jmax as u32, 1, MAX_JUNK_SIZE, &mut errors);
        check_range("AWG_S1", raw.s1 as u32, 0, MAX_PADDING, &mut errors);
        check_range("AWG_S2", raw.s2 as u32, 0, MAX_PADDING, &mut errors);
        check_range("AWG_S3", raw.s3 as u32, 0, MAX_PADDING, &mut errors);
        check_range("AWG_S4", raw.s4 as u32, 0, MAX_PADDING, &mut errors);

        let mut cps = [None, None, None, None, None];
        for (i, raw_template) in raw.cps_raw.iter().enumerate() {
            if let Some(src) = raw_template {
                match CpsTemplate::parse(src) {
                    Ok(t) => cps[i] = Some(t),
                    Err(source) => errors.push(ConfigError::Cps { var: CPS_VARS[i], source }),
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let mac1key_server = awg_crypto::mac1_key(&raw.server_pub);
        let mac1key_client = awg_crypto::mac1_key(&raw.client_pub);
        let max_scan = [raw.s1, raw.s2, raw.s3, raw.s4]
            .into_iter()
            .max()
            .unwrap_or(0) as usize;
        let h4_no_op = raw.h4.min == 4 && raw.h4.max == 4 && raw.s4 == 0;

        Ok(Config {
            jc: raw.jc,
            jmin: raw.jmin,
            jmax: raw.jmax,
            s1: raw.s1,
            s2: raw.s2,
            s3: raw.s3,
            s4: raw.s4,
            h1: raw.h1,
            h2: raw.h2,
            h3: raw.h3,
            h4: raw.h4,
            cps,
            server_pub: raw.server_pub,
            client_pub: raw.client_pub,
            timeout_secs: raw.timeout_secs,
            log_level: raw.log_level,
            mac1key_server,
            mac1key_client,
            max_scan,
            h4_no_op,
        })
    }

    pub fn server_pub_is_set(&self) -> bool {
        self.server_pub != [0u8; 32]
    }

    pub fn client_pub_is_set(&self) -> bool {
        self.client_pub != [0u8; 32]
    }
}

fn check_range(var: &'static str, value: u32, min: u32, max: u32, errors: &mut Vec<ConfigError>) {
    if value < min || value > max {
        errors.push(ConfigError::OutOfRange {
            var,
            reason: format!("{value} is outside [{min}, {max}]"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_raw() -> RawParams {
        RawParams {
            jc: 4,
            jmin: 10,
            jmax: 50,
            s1: 46,
            s2: 122,
            s3: 0,
            s4: 0,
            h1: RangeU32::single(1033089720),
            h2: RangeU32::single(1336452505),
            h3: RangeU32::single(1858775673),
            h4: RangeU32::single(332219739),
            cps_raw: [None, None, None, None, None],
            server_pub: [0; 32],
            client_pub: [0; 32],
            timeout_secs: 180,
            log_level: LogLevel::Info,
        }
    }

    #[test]
    fn valid_config_builds() {
        let cfg = Config::build(valid_raw()).unwrap();
        assert_eq!(cfg.max_scan, 122);
        assert!(!cfg.h4_no_op);
    }

    #[test]
    fn h4_no_op_requires_collapsed_four_and_zero_padding() {
        let mut raw = valid_raw();
        raw.h4 = RangeU32::single(4);
        raw.s4 = 0;
        let cfg = Config::build(raw).unwrap();
        assert!(cfg.h4_no_op);
    }

    #[test]
    fn jmin_greater_than_jmax_is_rejected() {
        let mut raw = valid_raw();
        raw.jmin = 100;
        raw.jmax = 10;
        let errs = Config::build(raw).unwrap_err();
        assert!(errs
            .iter()
            .any(|e| matches!(e, ConfigError::JunkRangeInverted { .. })));
    }

    #[test]
    fn errors_are_accumulated_not_fail_fast() {
        let mut raw = valid_raw();
        raw.jmin = 0; // out of range (below 1)
        raw.s1 = 9999; // out of range (above 256)
        raw.cps_raw[0] = Some(String::new()); // empty CPS template
        let errs = Config::build(raw).unwrap_err();
        assert_eq!(errs.len(), 3, "{errs:?}");
    }

    #[test]
    fn mac1_keys_derive_from_pubkeys() {
        let mut raw = valid_raw();
        raw.server_pub = [7; 32];
        let cfg = Config::build(raw).unwrap();
        assert_eq!(cfg.mac1key_server, awg_crypto::mac1_key(&[7; 32]));
        assert!(cfg.server_pub_is_set());
        assert!(!cfg.client_pub_is_set());
    }
}
