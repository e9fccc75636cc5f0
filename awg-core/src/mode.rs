//! Protocol-mode selector. Purely diagnostic: nothing in the transform
//! engine branches on this, it only shapes a startup log line.

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    V1,
    V1_5,
    V2,
}

impl ProtocolMode {
    pub fn classify(cfg: &Config) -> Self {
        let is_v2 = cfg.s3 > 0
            || cfg.s4 > 0
            || !cfg.h1.is_collapsed()
            || !cfg.h2.is_collapsed()
            || !cfg.h3.is_collapsed()
            || !cfg.h4.is_collapsed();
        if is_v2 {
            return Self::V2;
        }
        if cfg.cps.iter().any(Option::is_some) {
            return Self::V1_5;
        }
        Self::V1
    }
}

impl std::fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::V1 => "v1",
            Self::V1_5 => "v1.5",
            Self::V2 => "v2",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogLevel, RangeU32, RawParams};

    fn base_raw() -> RawParams {
        RawParams {
            jc: 0,
            jmin: 1,
            jmax: 1,
            s1: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            h1: RangeU32::single(1),
            h2: RangeU32::single(2),
            h3: RangeU32::single(3),
            h4: RangeU32::single(4),
            cps_raw: [None, None, None, None, None],
            server_pub: [0; 32],
            client_pub: [0; 32],
            timeout_secs: 180,
            log_level: LogLevel::Info,
        }
    }

    #[test]
    fn collapsed_ranges_no_padding_no_cps_is_v1() {
        let cfg = Config::build(base_raw()).unwrap();
        assert_eq!(ProtocolMode::classify(&cfg), ProtocolMode::V1);
    }

    #[test]
    fn cps_without_v2_signals_is_v1_5() {
        let mut raw = base_raw();
        raw.cps_raw[0] = Some("<b 0xAA>".to_string());
        let cfg = Config::build(raw).unwrap();
        assert_eq!(ProtocolMode::classify(&cfg), ProtocolMode::V1_5);
    }

    #[test]
    fn nontrivial_padding_or_ranges_is_v2() {
        let mut raw = base_raw();
        raw.s4 = 25;
        let cfg = Config::build(raw).unwrap();
        assert_eq!(ProtocolMode::classify(&cfg), ProtocolMode::V2);

        let mut raw = base_raw();
        raw.h1 = RangeU32::new(1, 5).unwrap();
        let cfg = Config::build(raw).unwrap();
        assert_eq!(ProtocolMode::classify(&cfg), ProtocolMode::V2);
    }
}
